//! Versioned kernel registration table
//!
//! Each [`KernelDef`] registers a kernel factory for one operator over an
//! inclusive opset version range and a set of element types. Within one
//! operator no two definitions may claim the same `(version, dtype)` pair,
//! so [`KernelRegistry::lookup`] resolves to at most one definition.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use super::OpKernel;
use super::elementwise::{BinaryKernel, BinaryOp, UnaryKernel, UnaryOp};
use super::where_cond::{WHERE_DTYPES, WhereKernel};
use crate::dtype::{DType, DTypeSet};
use crate::error::{Error, Result};

/// Creates a kernel instance for a resolved registration
pub type KernelFactory = Arc<dyn Fn() -> Box<dyn OpKernel> + Send + Sync>;

/// One registration: operator, version range, type constraint and factory
#[derive(Clone)]
pub struct KernelDef {
    /// Operator name
    pub op: &'static str,
    /// First opset version served
    pub since_version: u32,
    /// Last opset version served, `None` for open-ended
    pub until_version: Option<u32>,
    /// Element types served
    pub type_constraint: DTypeSet,
    /// Kernel constructor
    pub factory: KernelFactory,
}

impl KernelDef {
    /// Registration for `since..=until`
    pub fn versioned<F>(
        op: &'static str,
        since_version: u32,
        until_version: u32,
        type_constraint: DTypeSet,
        factory: F,
    ) -> Self
    where
        F: Fn() -> Box<dyn OpKernel> + Send + Sync + 'static,
    {
        Self {
            op,
            since_version,
            until_version: Some(until_version),
            type_constraint,
            factory: Arc::new(factory),
        }
    }

    /// Registration for `since` and every later version
    pub fn since<F>(
        op: &'static str,
        since_version: u32,
        type_constraint: DTypeSet,
        factory: F,
    ) -> Self
    where
        F: Fn() -> Box<dyn OpKernel> + Send + Sync + 'static,
    {
        Self {
            op,
            since_version,
            until_version: None,
            type_constraint,
            factory: Arc::new(factory),
        }
    }

    /// Whether this definition serves `version`
    pub fn covers_version(&self, version: u32) -> bool {
        version >= self.since_version && self.until_version.is_none_or(|until| version <= until)
    }

    /// Whether this definition serves `(op, version, dtype)`
    pub fn matches(&self, op: &str, version: u32, dtype: DType) -> bool {
        self.op == op && self.covers_version(version) && self.type_constraint.contains(dtype)
    }

    /// Whether both definitions claim some common `(version, dtype)` of one operator
    pub fn overlaps(&self, other: &KernelDef) -> bool {
        let end = |def: &KernelDef| def.until_version.unwrap_or(u32::MAX);
        self.op == other.op
            && self.since_version <= end(other)
            && other.since_version <= end(self)
            && !self.type_constraint.intersection(other.type_constraint).is_empty()
    }

    /// Instantiate the kernel
    pub fn create(&self) -> Box<dyn OpKernel> {
        (self.factory)()
    }
}

impl fmt::Debug for KernelDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelDef")
            .field("op", &self.op)
            .field("since_version", &self.since_version)
            .field("until_version", &self.until_version)
            .field("type_constraint", &self.type_constraint)
            .finish_non_exhaustive()
    }
}

/// Registration table keyed by operator name
#[derive(Debug, Default)]
pub struct KernelRegistry {
    defs: HashMap<&'static str, Vec<KernelDef>>,
}

impl KernelRegistry {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding every built-in kernel
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for def in default_defs() {
            registry.defs.entry(def.op).or_default().push(def);
        }
        registry
    }

    /// Add a definition
    ///
    /// Fails if the version range is empty or if it claims a `(version, dtype)`
    /// pair an existing definition of the same operator already serves.
    pub fn register(&mut self, def: KernelDef) -> Result<()> {
        if def.until_version.is_some_and(|until| until < def.since_version) {
            return Err(Error::InvalidArgument {
                arg: "until_version",
                reason: format!(
                    "{}: version range {}..={:?} is empty",
                    def.op, def.since_version, def.until_version
                ),
            });
        }
        let entries = self.defs.entry(def.op).or_default();
        if let Some(existing) = entries.iter().find(|e| e.overlaps(&def)) {
            return Err(Error::InvalidArgument {
                arg: "kernel_def",
                reason: format!("{def:?} overlaps registered {existing:?}"),
            });
        }
        log::debug!(
            "registered {} v{}..{:?} for {:?}",
            def.op,
            def.since_version,
            def.until_version,
            def.type_constraint
        );
        entries.push(def);
        Ok(())
    }

    /// The definition serving `(op, version, dtype)`
    pub fn lookup(&self, op: &str, version: u32, dtype: DType) -> Result<&KernelDef> {
        self.defs
            .get(op)
            .and_then(|defs| defs.iter().find(|d| d.matches(op, version, dtype)))
            .ok_or_else(|| Error::KernelNotFound {
                op: op.to_string(),
                version,
                dtype,
            })
    }

    /// Instantiate the kernel serving `(op, version, dtype)`
    pub fn create(&self, op: &str, version: u32, dtype: DType) -> Result<Box<dyn OpKernel>> {
        self.lookup(op, version, dtype).map(KernelDef::create)
    }

    /// Every definition, grouped by operator
    pub fn iter(&self) -> impl Iterator<Item = &KernelDef> {
        self.defs.values().flatten()
    }

    /// Number of definitions
    pub fn len(&self) -> usize {
        self.defs.values().map(Vec::len).sum()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-wide table of built-in kernels
pub fn default_registry() -> &'static KernelRegistry {
    static REGISTRY: OnceLock<KernelRegistry> = OnceLock::new();
    REGISTRY.get_or_init(KernelRegistry::with_defaults)
}

fn binary(op: BinaryOp) -> impl Fn() -> Box<dyn OpKernel> + Send + Sync + 'static {
    move || -> Box<dyn OpKernel> { Box::new(BinaryKernel::new(op)) }
}

fn unary(op: UnaryOp) -> impl Fn() -> Box<dyn OpKernel> + Send + Sync + 'static {
    move || -> Box<dyn OpKernel> { Box::new(UnaryKernel::new(op)) }
}

fn where_kernel() -> Box<dyn OpKernel> {
    Box::new(WhereKernel::new())
}

/// Built-in registrations, following the opset history of each operator
pub(crate) fn default_defs() -> Vec<KernelDef> {
    let mut defs = Vec::new();

    for op in [BinaryOp::Add, BinaryOp::Sub, BinaryOp::Mul, BinaryOp::Div] {
        let types = op.supported_dtypes();
        defs.push(KernelDef::versioned(op.name(), 7, 12, types, binary(op)));
        defs.push(KernelDef::versioned(op.name(), 13, 13, types, binary(op)));
        defs.push(KernelDef::since(op.name(), 14, types, binary(op)));
    }

    let pow = BinaryOp::Pow;
    let types = pow.supported_dtypes();
    defs.push(KernelDef::versioned(pow.name(), 7, 11, types, binary(pow)));
    defs.push(KernelDef::versioned(pow.name(), 12, 12, types, binary(pow)));
    defs.push(KernelDef::versioned(pow.name(), 13, 14, types, binary(pow)));
    defs.push(KernelDef::since(pow.name(), 15, types, binary(pow)));

    for op in UnaryOp::ALL {
        let types = op.supported_dtypes();
        defs.push(KernelDef::versioned(op.name(), 6, 12, types, unary(op)));
        if op == UnaryOp::Relu {
            defs.push(KernelDef::versioned(op.name(), 13, 13, types, unary(op)));
            defs.push(KernelDef::since(op.name(), 14, types, unary(op)));
        } else {
            defs.push(KernelDef::since(op.name(), 13, types, unary(op)));
        }
    }

    defs.push(KernelDef::versioned("Where", 9, 15, WHERE_DTYPES, where_kernel));
    defs.push(KernelDef::since("Where", 16, WHERE_DTYPES, where_kernel));

    defs
}
