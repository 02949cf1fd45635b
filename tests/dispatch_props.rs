//! Property tests for dispatch geometry and broadcast index arithmetic

use proptest::prelude::*;
use wgkern::program::{DispatchGeometry, MAX_GROUPS_PER_DIMENSION, packed_count};
use wgkern::tensor::{Layout, broadcast_shapes};

/// Straightforward broadcast offset: right-align, size-1 dims read index 0
fn reference_offset(shape: &[usize], out_shape: &[usize], out_index: &[usize]) -> usize {
    let pad = out_shape.len() - shape.len();
    let mut offset = 0;
    let mut stride = 1;
    for d in (0..shape.len()).rev() {
        let idx = if shape[d] == 1 { 0 } else { out_index[pad + d] };
        offset += idx * stride;
        stride *= shape[d];
    }
    offset
}

/// An output shape plus an input shape that broadcasts to it: a suffix of the
/// output with some dimensions collapsed to 1
fn broadcast_pair() -> impl Strategy<Value = (Vec<usize>, Vec<usize>)> {
    prop::collection::vec(1usize..5, 0..6).prop_flat_map(|out| {
        let rank = out.len();
        (Just(out), 0..=rank, prop::collection::vec(any::<bool>(), rank))
    })
    .prop_map(|(out, in_rank, collapse)| {
        let pad = out.len() - in_rank;
        let input: Vec<usize> = out[pad..]
            .iter()
            .zip(&collapse[pad..])
            .map(|(&dim, &ones)| if ones { 1 } else { dim })
            .collect();
        (input, out)
    })
}

proptest! {
    #[test]
    fn packed_count_is_ceil_division(numel in 0usize..1_000_000, width in 1u32..9) {
        let packed = packed_count(numel, width).unwrap() as usize;
        prop_assert!(packed * width as usize >= numel);
        prop_assert!(packed == 0 || (packed - 1) * (width as usize) < numel);
    }

    #[test]
    fn packed_count_is_monotonic(a in 0usize..1_000_000, b in 0usize..1_000_000) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(packed_count(lo, 4).unwrap() <= packed_count(hi, 4).unwrap());
    }

    #[test]
    fn geometry_covers_every_unit(packed in 0u32..=u32::MAX / 64) {
        let geometry = DispatchGeometry::for_packed(packed, 64).unwrap();
        let [x, y, z] = geometry.groups();
        prop_assert!(x <= MAX_GROUPS_PER_DIMENSION);
        prop_assert!(y <= MAX_GROUPS_PER_DIMENSION);
        prop_assert!(z <= MAX_GROUPS_PER_DIMENSION);
        prop_assert!(geometry.total_groups() * 64 >= packed as u64);
        prop_assert_eq!(geometry.is_empty(), packed == 0);
        if packed as u64 <= MAX_GROUPS_PER_DIMENSION as u64 * 64 {
            prop_assert_eq!(geometry.as_slice().len(), 1);
        }
    }

    #[test]
    fn broadcast_offset_matches_reference(
        (in_shape, out_shape) in broadcast_pair(),
        seed in any::<usize>(),
    ) {
        let joined = broadcast_shapes(&[in_shape.as_slice(), out_shape.as_slice()]).unwrap();
        prop_assert_eq!(joined.as_slice(), out_shape.as_slice());

        let layout = Layout::contiguous(&in_shape).unwrap();
        let out = Layout::contiguous(&out_shape).unwrap();
        let offset = seed % out.elem_count();
        let index = out.offset_to_indices(offset).unwrap();

        let got = layout.broadcast_offset(&out_shape, &index).unwrap();
        prop_assert_eq!(got, reference_offset(&in_shape, &out_shape, &index));
        prop_assert!(got < layout.elem_count());
    }
}
