//! Integration tests for the broadcasting Where kernel

mod common;

use common::{RecordingContext, validate_wgsl, words};
use wgkern::dtype::DType;
use wgkern::error::Error;
use wgkern::ops::default_registry;
use wgkern::program::{DependencyLevel, pack_uniforms};
use wgkern::tensor::{Layout, TensorView};

fn where_context(c: &[usize], a: &[usize], b: &[usize], dtype: DType) -> RecordingContext {
    RecordingContext::new(
        vec![
            TensorView::new(c, DType::Bool).unwrap(),
            TensorView::new(a, dtype).unwrap(),
            TensorView::new(b, dtype).unwrap(),
        ],
        1,
    )
}

#[test]
fn test_where_broadcast_program() {
    let kernel = default_registry().create("Where", 16, DType::F32).unwrap();
    let mut ctx = where_context(&[1, 3], &[2, 3], &[2, 3], DType::F32);
    kernel.compute(&mut ctx).unwrap();

    assert_eq!(ctx.outputs[0].shape(), &[2, 3]);
    let program = &ctx.programs[0];
    assert_eq!(program.packed_count(), 2);
    assert!(
        program
            .inputs()
            .iter()
            .all(|i| i.dependency == DependencyLevel::RankOnly)
    );

    let source = program.generate_source().unwrap();
    assert_eq!(source.inputs, 3);
    assert_eq!(source.outputs, 1);
    assert!(source.code.contains("output_data[global_idx] = output_value;"));
    validate_wgsl(&source.code).unwrap();

    let names: Vec<&str> = source.uniforms.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(
        names,
        [
            "vec_size",
            "output_size",
            "c_data_shape",
            "c_data_strides",
            "a_data_shape",
            "a_data_strides",
            "b_data_shape",
            "b_data_strides",
            "output_data_shape",
            "output_data_strides",
        ]
    );

    let packed = words(&pack_uniforms(&program.resolve_uniforms(&source).unwrap()));
    // vec_size, output_size, then vec2<u32> pairs
    assert_eq!(&packed[..6], &[2, 6, 1, 3, 3, 1]);
    assert_eq!(&packed[6..8], &[2, 3]);
    assert_eq!(packed.len() % 4, 0);
}

#[test]
fn test_where_output_broadcasts_all_inputs() {
    let kernel = default_registry().create("Where", 9, DType::I32).unwrap();
    let mut ctx = where_context(&[4, 1], &[1, 5], &[], DType::I32);
    kernel.compute(&mut ctx).unwrap();
    assert_eq!(ctx.outputs[0].shape(), &[4, 5]);

    let source = ctx.programs[0].generate_source().unwrap();
    validate_wgsl(&source.code).unwrap();
}

#[test]
fn test_where_condition_broadcast_offsets() {
    // a [1, 3] condition read at output index (1, 2) hits the same flag as (0, 2)
    let cond = Layout::contiguous(&[1, 3]).unwrap();
    let out = [2, 3];
    assert_eq!(
        cond.broadcast_offset(&out, &[1, 2]).unwrap(),
        cond.broadcast_offset(&out, &[0, 2]).unwrap()
    );
    assert_eq!(cond.broadcast_offset(&out, &[1, 2]).unwrap(), 2);
}

#[test]
fn test_where_rank_only_key() {
    let kernel = default_registry().create("Where", 16, DType::F32).unwrap();
    let key = |c: &[usize], a: &[usize], b: &[usize]| {
        let mut ctx = where_context(c, a, b, DType::F32);
        kernel.compute(&mut ctx).unwrap();
        ctx.programs[0].cache_key()
    };
    assert_eq!(key(&[1, 3], &[2, 3], &[2, 3]), key(&[7, 1], &[1, 9], &[7, 9]));
    assert_ne!(key(&[1, 3], &[2, 3], &[2, 3]), key(&[3], &[2, 3], &[2, 3]));
}

#[test]
fn test_where_high_rank() {
    let kernel = default_registry().create("Where", 16, DType::U32).unwrap();
    let mut ctx = where_context(&[2, 1, 2, 1, 2, 1], &[2, 2, 2, 2, 2, 2], &[1], DType::U32);
    kernel.compute(&mut ctx).unwrap();

    let source = ctx.programs[0].generate_source().unwrap();
    assert!(source.code.contains("array<vec4<u32>, 2>"));
    validate_wgsl(&source.code).unwrap();
}

#[test]
fn test_where_rejects_non_bool_condition() {
    let kernel = default_registry().create("Where", 16, DType::F32).unwrap();
    let mut ctx = RecordingContext::new(
        vec![
            TensorView::new(&[4], DType::F32).unwrap(),
            TensorView::new(&[4], DType::F32).unwrap(),
            TensorView::new(&[4], DType::F32).unwrap(),
        ],
        1,
    );
    assert!(matches!(
        kernel.compute(&mut ctx),
        Err(Error::UnsupportedDType { dtype: DType::F32, .. })
    ));
    assert!(ctx.programs.is_empty());
}

#[test]
fn test_where_incompatible_shapes() {
    let kernel = default_registry().create("Where", 16, DType::F32).unwrap();
    let mut ctx = where_context(&[3], &[4], &[4], DType::F32);
    assert!(matches!(
        kernel.compute(&mut ctx),
        Err(Error::BroadcastError { .. })
    ));
}

#[test]
fn test_where_empty_output() {
    let kernel = default_registry().create("Where", 16, DType::F32).unwrap();
    let mut ctx = where_context(&[0, 3], &[1, 3], &[1], DType::F32);
    kernel.compute(&mut ctx).unwrap();
    assert_eq!(ctx.outputs[0].shape(), &[0, 3]);
    assert!(ctx.programs.is_empty());
}

#[test]
fn test_where_version_gaps() {
    assert!(default_registry().lookup("Where", 8, DType::F32).is_err());
    assert!(default_registry().lookup("Where", 9, DType::F32).is_ok());
    assert!(default_registry().lookup("Where", 21, DType::I32).is_ok());
    assert!(matches!(
        default_registry().lookup("Where", 16, DType::String),
        Err(Error::KernelNotFound { .. })
    ));
}

#[test]
fn test_where_broadcast_count_overflow() {
    let kernel = default_registry().create("Where", 16, DType::F32).unwrap();
    let mut ctx = where_context(&[1usize << 62, 1], &[1, 8], &[8], DType::F32);
    assert!(matches!(
        kernel.compute(&mut ctx),
        Err(Error::GeometryOverflow { what: "element_count", .. })
    ));
    assert!(ctx.outputs.is_empty());
    assert!(ctx.programs.is_empty());
}
