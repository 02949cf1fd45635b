//! Dispatch geometry: packed element counts and workgroup grids

use crate::error::{Error, Result};

/// Workgroup size for elementwise compute shaders
pub const WORKGROUP_SIZE: u32 = 64;

/// Largest workgroup count WebGPU guarantees per grid dimension
pub const MAX_GROUPS_PER_DIMENSION: u32 = 65535;

/// Number of packed storage units covering `numel` logical elements
///
/// `ceil(numel / width)`, rejected with `GeometryOverflow` if it does not fit
/// the 32-bit index range the shader works in.
pub fn packed_count(numel: usize, width: u32) -> Result<u32> {
    if width == 0 {
        return Err(Error::InvalidArgument {
            arg: "packing_width",
            reason: "packing width must be at least 1".to_string(),
        });
    }
    let packed = (numel as u128).div_ceil(width as u128);
    u32::try_from(packed).map_err(|_| Error::geometry_overflow("packed_count", packed))
}

/// Number of workgroups covering `packed` execution units
pub fn workgroup_count(packed: u32, workgroup_size: u32) -> Result<u32> {
    if workgroup_size == 0 {
        return Err(Error::InvalidArgument {
            arg: "workgroup_size",
            reason: "workgroup size must be at least 1".to_string(),
        });
    }
    let groups = (packed as u64).div_ceil(workgroup_size as u64);
    u32::try_from(groups).map_err(|_| Error::geometry_overflow("workgroup_count", groups))
}

/// Workgroup grid handed to the device
///
/// One-dimensional whenever the group count fits a single dimension. Larger
/// counts are folded into a 2-D or 3-D grid covering at least as many groups;
/// the kernel recomputes the linear index from `workgroup_id` and
/// `num_workgroups` and its bounds guard discards the surplus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatchGeometry {
    groups: [u32; 3],
    dims: usize,
}

impl DispatchGeometry {
    /// One-dimensional geometry of `groups` workgroups
    pub fn linear(groups: u32) -> Result<Self> {
        Self::fold(groups, MAX_GROUPS_PER_DIMENSION)
    }

    /// Geometry covering `packed` execution units
    ///
    /// Fails if the invocation index of any launched invocation, surplus
    /// groups included, would wrap the shader's 32-bit `global_idx`.
    pub fn for_packed(packed: u32, workgroup_size: u32) -> Result<Self> {
        let geometry = Self::linear(workgroup_count(packed, workgroup_size)?)?;
        let invocations = geometry.total_groups() * workgroup_size as u64;
        if invocations > u32::MAX as u64 + 1 {
            return Err(Error::geometry_overflow("invocations", invocations));
        }
        Ok(geometry)
    }

    /// Fold `groups` into at most three dimensions of at most `limit` each
    pub fn fold(groups: u32, limit: u32) -> Result<Self> {
        if limit == 0 {
            return Err(Error::InvalidArgument {
                arg: "limit",
                reason: "per-dimension limit must be at least 1".to_string(),
            });
        }
        if groups <= limit {
            return Ok(Self {
                groups: [groups, 1, 1],
                dims: 1,
            });
        }

        let total = groups as u64;
        let limit = limit as u64;

        let x = ceil_root(total, 2);
        let y = total.div_ceil(x);
        if x <= limit && y <= limit {
            return Ok(Self {
                groups: [x as u32, y as u32, 1],
                dims: 2,
            });
        }

        let x = ceil_root(total, 3);
        let z = total.div_ceil(x * x);
        if x <= limit && z <= limit {
            return Ok(Self {
                groups: [x as u32, x as u32, z as u32],
                dims: 3,
            });
        }

        Err(Error::geometry_overflow("dispatch_groups", total))
    }

    /// Workgroup counts as `[x, y, z]`
    #[inline]
    pub fn groups(&self) -> [u32; 3] {
        self.groups
    }

    /// The meaningful leading counts (1 to 3 values)
    #[inline]
    pub fn as_slice(&self) -> &[u32] {
        &self.groups[..self.dims]
    }

    /// Total workgroups launched
    pub fn total_groups(&self) -> u64 {
        self.groups.iter().map(|&g| g as u64).product()
    }

    /// True when nothing is launched
    pub fn is_empty(&self) -> bool {
        self.groups[0] == 0
    }
}

/// Smallest `r` with `r^n >= value`
fn ceil_root(value: u64, n: u32) -> u64 {
    let mut r = (value as f64).powf(1.0 / n as f64).floor() as u64;
    while r.pow(n) < value {
        r += 1;
    }
    while r > 1 && (r - 1).pow(n) >= value {
        r -= 1;
    }
    r
}
