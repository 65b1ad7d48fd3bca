use float_cmp::approx_eq;

use super::*;
use crate::emitter::{FunctionSignature, ModuleEmitter, Optimizer, TargetDescription};
use crate::error::{CompileError, ValueError, ValueResult};

/// `y = a * x + y`, then clamp negatives to zero.
fn saxpy_relu(
    ctx: &mut dyn ExecutionContext,
    a: &Scalar,
    x: &Vector,
    y: &Vector,
) -> ValueResult<()> {
    let scaled = x.copy(ctx)?;
    scaled.scale(ctx, a)?;
    y.add_assign(ctx, &scaled)?;
    y.apply(ctx, UnaryOperation::Relu)
}

fn emitted_vector(ty: ElementType, address: cranelift::codegen::ir::Value, size: usize) -> Vector {
    Vector::new(Value::emitted(ty, address).with_layout(MemoryLayout::vector(size))).unwrap()
}

fn emitted_matrix(
    ty: ElementType,
    address: cranelift::codegen::ir::Value,
    rows: usize,
    columns: usize,
) -> Matrix {
    let layout = MemoryLayout::matrix(rows, columns, DimensionOrder::RowMajor);
    Matrix::new(Value::emitted(ty, address).with_layout(layout)).unwrap()
}

#[test]
fn same_algorithm_runs_and_compiles() {
    let x = vec![1.0f32, -2.0, 3.0, -4.0];
    let y = vec![0.5f32, 0.5, 0.5, 0.5];

    let mut ctx = ImmediateContext::new();
    let host_y = Vector::from_data(y.clone());
    saxpy_relu(&mut ctx, &Scalar::literal(2.0f32), &Vector::from_data(x.clone()), &host_y).unwrap();
    let expected = host_y.to_host_data().unwrap();

    let mut emitter =
        ModuleEmitter::new("saxpy", &TargetDescription::host(), Optimizer::standard()).unwrap();
    let ptr = emitter.pointer_type();
    emitter
        .emit_function(
            "saxpy_relu",
            &FunctionSignature::new(vec![ptr, ptr], vec![]),
            |f| {
                let x_ptr = f.parameter(0)?;
                let y_ptr = f.parameter(1)?;
                let x = emitted_vector(ElementType::Float, x_ptr, 4);
                let y = emitted_vector(ElementType::Float, y_ptr, 4);
                let mut ctx = EmissionContext::new(f);
                saxpy_relu(&mut ctx, &Scalar::literal(2.0f32), &x, &y)?;
                Ok::<_, CompileError>(vec![])
            },
        )
        .unwrap();
    let finished = emitter.finish().unwrap();
    let run: extern "C" fn(*const f32, *mut f32) =
        unsafe { std::mem::transmute(finished.function_pointer("saxpy_relu").unwrap()) };

    let mut compiled_y = y;
    run(x.as_ptr(), compiled_y.as_mut_ptr());

    let expected = expected.as_f32().unwrap();
    for (a, b) in expected.iter().zip(&compiled_y) {
        assert!(approx_eq!(f32, *a, *b, ulps = 2));
    }
    assert_eq!(compiled_y, vec![2.5, 0.0, 6.5, 0.0]);
}

#[test]
fn emitted_views_share_storage() {
    let mut emitter =
        ModuleEmitter::new("views", &TargetDescription::host(), Optimizer::standard()).unwrap();
    let ptr = emitter.pointer_type();
    emitter
        .emit_function(
            "bump_corner",
            &FunctionSignature::new(vec![ptr], vec![]),
            |f| {
                let m = emitted_matrix(ElementType::Int32, f.parameter(0)?, 3, 4);
                let mut ctx = EmissionContext::new(f);
                let corner = m.sub_matrix(&mut ctx, 1usize, 2usize, 2, 2)?;
                corner.update_scalar(&mut ctx, BinaryOperation::Add, &Scalar::literal(100i32))?;
                let column = m.column(&mut ctx, 0usize)?;
                column.fill(&mut ctx, &Scalar::literal(-1i32))?;
                Ok::<_, CompileError>(vec![])
            },
        )
        .unwrap();
    let finished = emitter.finish().unwrap();
    let run: extern "C" fn(*mut i32) =
        unsafe { std::mem::transmute(finished.function_pointer("bump_corner").unwrap()) };

    let mut data: Vec<i32> = (0..12).collect();
    run(data.as_mut_ptr());
    assert_eq!(data, vec![-1, 1, 2, 3, -1, 5, 106, 107, -1, 9, 110, 111]);
}

#[test]
fn emitted_matrix_vector_product_with_dynamic_rows() {
    let mut emitter =
        ModuleEmitter::new("matvec", &TargetDescription::host(), Optimizer::standard()).unwrap();
    let ptr = emitter.pointer_type();
    emitter
        .emit_function(
            "matvec",
            &FunctionSignature::new(vec![ptr, ptr, ptr], vec![]),
            |f| {
                let m = emitted_matrix(ElementType::Double, f.parameter(0)?, 2, 3);
                let v = emitted_vector(ElementType::Double, f.parameter(1)?, 3);
                let out = emitted_vector(ElementType::Double, f.parameter(2)?, 2);
                let mut ctx = EmissionContext::new(f);
                m.multiply_vector(&mut ctx, &v, &out)?;
                Ok::<_, CompileError>(vec![])
            },
        )
        .unwrap();
    let finished = emitter.finish().unwrap();
    let run: extern "C" fn(*const f64, *const f64, *mut f64) =
        unsafe { std::mem::transmute(finished.function_pointer("matvec").unwrap()) };

    let m = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    let v = [1.0, 0.0, -1.0];
    let mut out = [0.0; 2];
    run(m.as_ptr(), v.as_ptr(), out.as_mut_ptr());
    assert_eq!(out, [-2.0, -2.0]);
}

#[test]
fn host_values_cannot_be_emitted() {
    let mut emitter =
        ModuleEmitter::new("mismatch", &TargetDescription::host(), Optimizer::standard()).unwrap();
    let result = emitter.emit_function("mix", &FunctionSignature::default(), |f| {
        let host = Vector::from_data(vec![1.0f32, 2.0]);
        let mut ctx = EmissionContext::new(f);
        host.add_scalar(&mut ctx, &Scalar::literal(1.0f32))?;
        Ok::<_, CompileError>(vec![])
    });
    assert!(matches!(
        result,
        Err(CompileError::Value(ValueError::ContextMismatch { .. }))
    ));
}

#[test]
fn literal_arithmetic_folds_without_a_context() {
    let mut ctx = ImmediateContext::new();
    let sum = Scalar::literal(2i64)
        .add(&mut ctx, &Scalar::literal(3i64))
        .unwrap();
    assert_eq!(sum.as_literal(), Some(ScalarValue::Int64(5)));
    assert_eq!(ctx.allocations(), 0);
}
