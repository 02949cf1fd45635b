//! Integration tests for unary and binary elementwise kernels

mod common;

use common::{FailingContext, RecordingContext, validate_wgsl, words};
use wgkern::dtype::DType;
use wgkern::error::Error;
use wgkern::ops::default_registry;
use wgkern::program::{DependencyLevel, pack_uniforms};
use wgkern::tensor::TensorView;

// ============================================================================
// Binary Operations
// ============================================================================

#[test]
fn test_add_f32_program() {
    let a = TensorView::new(&[2, 3], DType::F32).unwrap();
    let kernel = default_registry().create("Add", 14, DType::F32).unwrap();
    let mut ctx = RecordingContext::new(vec![a.clone(), a.clone()], 0);

    kernel.compute(&mut ctx).unwrap();

    assert_eq!(ctx.outputs, vec![a]);
    let program = &ctx.programs[0];
    assert_eq!(program.name(), "Add");
    assert!(
        program
            .inputs()
            .iter()
            .all(|i| i.dependency == DependencyLevel::TypeOnly)
    );
    assert_eq!(program.packed_count(), 2);
    assert_eq!(program.dispatch().as_slice(), &[1]);

    let source = program.generate_source().unwrap();
    assert!(source.code.contains("y[global_idx] = a + b;"));
    validate_wgsl(&source.code).unwrap();

    let uniforms = program.resolve_uniforms(&source).unwrap();
    assert_eq!(words(&pack_uniforms(&uniforms)), vec![2, 0, 0, 0]);
}

#[test]
fn test_binary_ops_across_versions() {
    for (op, version) in [("Sub", 7), ("Mul", 13), ("Div", 14), ("Pow", 12), ("Pow", 15)] {
        let x = TensorView::new(&[4, 4], DType::F32).unwrap();
        let kernel = default_registry().create(op, version, DType::F32).unwrap();
        let mut ctx = RecordingContext::new(vec![x.clone(), x], 0);
        kernel.compute(&mut ctx).unwrap();

        let source = ctx.programs[0].generate_source().unwrap();
        validate_wgsl(&source.code).unwrap_or_else(|e| panic!("{op}: {e}\n{}", source.code));
    }
}

#[test]
fn test_add_i32_and_u32() {
    for dtype in [DType::I32, DType::U32] {
        let x = TensorView::new(&[9], dtype).unwrap();
        let kernel = default_registry().create("Add", 13, dtype).unwrap();
        let mut ctx = RecordingContext::new(vec![x.clone(), x], 0);
        kernel.compute(&mut ctx).unwrap();

        let program = &ctx.programs[0];
        assert_eq!(program.packed_count(), 3);
        let source = program.generate_source().unwrap();
        assert!(source.code.contains(&format!("vec4<{dtype}>")));
        validate_wgsl(&source.code).unwrap();
    }
}

#[test]
fn test_same_dtype_shares_cache_key_across_shapes() {
    let kernel = default_registry().create("Mul", 14, DType::F32).unwrap();
    let key = |shape: &[usize]| {
        let x = TensorView::new(shape, DType::F32).unwrap();
        kernel.build_program(&[x.clone(), x.clone()], &x).unwrap().cache_key()
    };
    assert_eq!(key(&[4]), key(&[3, 1000]));

    let i = TensorView::new(&[4], DType::I32).unwrap();
    let int_key = default_registry()
        .create("Mul", 14, DType::I32)
        .unwrap()
        .build_program(&[i.clone(), i.clone()], &i)
        .unwrap()
        .cache_key();
    assert_ne!(key(&[4]), int_key);
}

#[test]
fn test_string_add_fails_without_source() {
    assert!(matches!(
        default_registry().lookup("Add", 14, DType::String),
        Err(Error::KernelNotFound { .. })
    ));

    // a kernel handed string operands directly rejects them as well
    let kernel = default_registry().create("Add", 14, DType::F32).unwrap();
    let s = TensorView::new(&[4], DType::String).unwrap();
    let mut ctx = RecordingContext::new(vec![s.clone(), s], 0);
    let err = kernel.compute(&mut ctx).unwrap_err();
    assert!(matches!(err, Error::UnsupportedDType { dtype: DType::String, .. }));
    assert!(ctx.programs.is_empty());
}

#[test]
fn test_binary_shape_mismatch() {
    let kernel = default_registry().create("Add", 14, DType::F32).unwrap();
    let mut ctx = RecordingContext::new(
        vec![
            TensorView::new(&[2, 3], DType::F32).unwrap(),
            TensorView::new(&[1, 3], DType::F32).unwrap(),
        ],
        0,
    );
    assert!(matches!(
        kernel.compute(&mut ctx),
        Err(Error::ShapeMismatch { .. })
    ));
}

// ============================================================================
// Unary Operations
// ============================================================================

#[test]
fn test_unary_ops_generate_valid_wgsl() {
    for op in ["Abs", "Neg", "Sqrt", "Exp", "Log", "Ceil", "Floor", "Sigmoid", "Relu"] {
        let x = TensorView::new(&[10], DType::F32).unwrap();
        let kernel = default_registry().create(op, 14, DType::F32).unwrap();
        let mut ctx = RecordingContext::new(vec![x], 0);
        kernel.compute(&mut ctx).unwrap();

        let program = &ctx.programs[0];
        assert_eq!(program.name(), op);
        assert_eq!(program.packed_count(), 3);
        let source = program.generate_source().unwrap();
        assert!(source.code.contains("let a = x[global_idx];"));
        validate_wgsl(&source.code).unwrap_or_else(|e| panic!("{op}: {e}\n{}", source.code));
    }
}

#[test]
fn test_abs_uses_template_expression() {
    let x = TensorView::new(&[5], DType::F32).unwrap();
    let kernel = default_registry().create("Abs", 6, DType::F32).unwrap();
    let program = kernel.build_program(std::slice::from_ref(&x), &x).unwrap();
    let source = program.generate_source().unwrap();
    assert!(source.code.contains("y[global_idx] = abs(a);"));
}

#[test]
fn test_float_only_unary_rejects_ints() {
    assert!(default_registry().lookup("Sqrt", 13, DType::I32).is_err());
    assert!(default_registry().lookup("Abs", 13, DType::I32).is_ok());
    assert!(default_registry().lookup("Neg", 13, DType::U32).is_err());
}

// ============================================================================
// Edge Cases
// ============================================================================

#[test]
fn test_empty_output_dispatches_nothing() {
    let x = TensorView::new(&[0, 4], DType::F32).unwrap();
    let kernel = default_registry().create("Exp", 13, DType::F32).unwrap();
    let mut ctx = RecordingContext::new(vec![x.clone()], 0);
    kernel.compute(&mut ctx).unwrap();
    assert_eq!(ctx.outputs, vec![x]);
    assert!(ctx.programs.is_empty());
}

#[test]
fn test_scalar_operands() {
    let x = TensorView::new(&[], DType::F32).unwrap();
    let kernel = default_registry().create("Add", 14, DType::F32).unwrap();
    let mut ctx = RecordingContext::new(vec![x.clone(), x], 0);
    kernel.compute(&mut ctx).unwrap();
    assert_eq!(ctx.programs[0].packed_count(), 1);
}

#[test]
fn test_adapter_errors_propagate_unchanged() {
    use std::error::Error as _;

    let x = TensorView::new(&[8], DType::F32).unwrap();
    let kernel = default_registry().create("Add", 14, DType::F32).unwrap();
    let mut ctx = FailingContext {
        inputs: vec![x.clone(), x],
        output_dtype: DType::F32,
    };
    let err = kernel.compute(&mut ctx).unwrap_err();
    assert!(matches!(err, Error::Execution(_)));
    assert_eq!(err.source().unwrap().to_string(), "device lost");
}

#[test]
fn test_unrepresentable_element_count_is_rejected() {
    let err = TensorView::new(&[1usize << 62, 8], DType::F32).unwrap_err();
    assert!(matches!(err, Error::GeometryOverflow { what: "element_count", .. }));

    // the largest count that still fits is accepted and caught by the dispatch range
    let x = TensorView::new(&[1usize << 62, 2], DType::F32).unwrap();
    let kernel = default_registry().create("Neg", 13, DType::F32).unwrap();
    let mut ctx = RecordingContext::new(vec![x], 0);
    assert!(matches!(
        kernel.compute(&mut ctx),
        Err(Error::GeometryOverflow { what: "packed_count", .. })
    ));
    assert!(ctx.programs.is_empty());
}
