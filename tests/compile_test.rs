// Compiled maps must agree with host evaluation of the same map.

use float_cmp::approx_eq;
use flowc::value::{BinaryOperation, DimensionOrder, ElementType, HostData, UnaryOperation};
use flowc::{
    BinaryOperationNode, CompileError, CompilerSettings, ConstantNode, FullyConnectedNode,
    GraphError, InputNode, InputPort, Map, MapCompiler, Model, UnaryOperationNode,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn add_constant_map() -> Map {
    let mut model = Model::new();
    let x = model.add_node(InputNode::new(ElementType::Float, 3)).unwrap();
    let x_out = model.output(x, 0).unwrap();
    let five = model.add_node(ConstantNode::new(vec![5.0f32; 3])).unwrap();
    let five_out = model.output(five, 0).unwrap();
    let sum = model
        .add_node(BinaryOperationNode::new(x_out, five_out, BinaryOperation::Add))
        .unwrap();
    let y = model.output(sum, 0).unwrap();
    Map::new(model, &[("x", x)], &[("y", y)]).unwrap()
}

fn dense_map(order: DimensionOrder) -> Map {
    let mut model = Model::new();
    let x = model.add_node(InputNode::new(ElementType::Float, 3)).unwrap();
    let x_out = model.output(x, 0).unwrap();
    let dense = model
        .add_node(
            FullyConnectedNode::new(
                x_out,
                vec![0.5f32, -1.0, 2.0, 1.5, 0.25, -0.75],
                vec![0.1f32, -0.2],
                2,
                3,
            )
            .with_order(order)
            .with_activation(UnaryOperation::Relu),
        )
        .unwrap();
    let y = model.output(dense, 0).unwrap();
    Map::new(model, &[("x", x)], &[("y", y)]).unwrap()
}

fn assert_close(expected: &HostData, actual: &HostData) {
    let (expected, actual) = (expected.as_f32().unwrap(), actual.as_f32().unwrap());
    assert_eq!(expected.len(), actual.len());
    for (e, a) in expected.iter().zip(actual) {
        assert!(approx_eq!(f32, *e, *a, epsilon = 1e-5), "expected {}, got {}", e, a);
    }
}

#[test]
fn test_compiled_add_constant() {
    init_logging();
    let mut map = add_constant_map();
    let mut compiled = MapCompiler::default().compile(&map, "add_five").unwrap();

    let input = vec![HostData::from(vec![1.0f32, 2.0, 3.0])];
    let native = compiled.compute(&input).unwrap();
    assert_eq!(native, vec![HostData::Float(vec![6.0, 7.0, 8.0])]);
    assert_eq!(map.compute(&input).unwrap(), native);

    assert_eq!(compiled.name(), "add_five");
    assert_eq!(compiled.input_names().collect::<Vec<_>>(), ["x"]);
    assert_eq!(compiled.output_names().collect::<Vec<_>>(), ["y"]);
    assert!(compiled.entry_point().is_ok());
}

#[test]
fn test_compiled_dense_layer_matches_interpreter() {
    init_logging();
    for order in [DimensionOrder::RowMajor, DimensionOrder::ColumnMajor] {
        let mut map = dense_map(order);
        let mut compiled = MapCompiler::default().compile(&map, "dense").unwrap();
        for input in [[1.0f32, 2.0, 3.0], [-1.0, 0.5, 0.0], [0.0, 0.0, 0.0]] {
            let input = vec![HostData::from(input.to_vec())];
            let expected = map.compute(&input).unwrap();
            let actual = compiled.compute(&input).unwrap();
            assert_close(&expected[0], &actual[0]);
        }
    }
}

#[test]
fn test_unoptimized_compile_gives_same_results() {
    let settings = CompilerSettings {
        optimize: false,
        ..CompilerSettings::default()
    };
    let mut map = dense_map(DimensionOrder::RowMajor);
    let mut compiled = MapCompiler::new(settings).compile(&map, "dense_O0").unwrap();
    let input = vec![HostData::from(vec![2.0f32, -1.0, 0.5])];
    assert_close(&map.compute(&input).unwrap()[0], &compiled.compute(&input).unwrap()[0]);
}

#[test]
fn test_concatenated_inputs_and_broadcast() {
    let mut model = Model::new();
    let a = model.add_node(InputNode::new(ElementType::Double, 2)).unwrap();
    let b = model.add_node(InputNode::new(ElementType::Double, 3)).unwrap();
    let a_out = model.output(a, 0).unwrap();
    let b_out = model.output(b, 0).unwrap();

    let mut square = UnaryOperationNode::new(a_out, UnaryOperation::Square);
    square.input = InputPort::concat("input", &[a_out, b_out]).unwrap();
    let square = model.add_node(square).unwrap();
    let square_out = model.output(square, 0).unwrap();

    let half = model.add_node(ConstantNode::new(vec![0.5f64])).unwrap();
    let half_out = model.output(half, 0).unwrap();
    let scaled = model
        .add_node(BinaryOperationNode::new(square_out, half_out, BinaryOperation::Multiply))
        .unwrap();
    let y = model.output(scaled, 0).unwrap();
    let mut map = Map::new(model, &[("a", a), ("b", b)], &[("y", y), ("squares", square_out)]).unwrap();

    let inputs = vec![
        HostData::from(vec![1.0f64, -2.0]),
        HostData::from(vec![3.0f64, 0.0, 4.0]),
    ];
    let mut compiled = MapCompiler::default().compile(&map, "concat").unwrap();
    let native = compiled.compute(&inputs).unwrap();
    assert_eq!(native[0], HostData::Double(vec![0.5, 2.0, 4.5, 0.0, 8.0]));
    assert_eq!(native[1], HostData::Double(vec![1.0, 4.0, 9.0, 0.0, 16.0]));
    assert_eq!(map.compute(&inputs).unwrap(), native);
}

#[test]
fn test_integer_maps_compile() {
    let mut model = Model::new();
    let x = model.add_node(InputNode::new(ElementType::Int64, 4)).unwrap();
    let x_out = model.output(x, 0).unwrap();
    let abs = model
        .add_node(UnaryOperationNode::new(x_out, UnaryOperation::Abs))
        .unwrap();
    let abs_out = model.output(abs, 0).unwrap();
    let min = model
        .add_node(BinaryOperationNode::new(abs_out, x_out, BinaryOperation::Min))
        .unwrap();
    let y = model.output(min, 0).unwrap();
    let map = Map::new(model, &[("x", x)], &[("y", y)]).unwrap();

    let mut compiled = MapCompiler::default().compile(&map, "ints").unwrap();
    let out = compiled
        .compute(&[HostData::from(vec![-3i64, 7, 0, -1])])
        .unwrap();
    assert_eq!(out, vec![HostData::Int64(vec![-3, 7, 0, -1])]);
}

#[test]
fn test_composites_require_refinement() {
    let settings = CompilerSettings {
        refine_before_compile: false,
        ..CompilerSettings::default()
    };
    let map = dense_map(DimensionOrder::RowMajor);
    let result = MapCompiler::new(settings).compile(&map, "dense");
    assert!(matches!(result, Err(CompileError::NotCompilable { .. })));

    let refined = map.refine(&Default::default()).unwrap();
    let settings = CompilerSettings {
        refine_before_compile: false,
        ..CompilerSettings::default()
    };
    assert!(MapCompiler::new(settings).compile(&refined, "dense").is_ok());
}

#[test]
fn test_refinement_limit_applies_to_compilation() {
    let settings = CompilerSettings {
        max_refinement_iterations: 1,
        ..CompilerSettings::default()
    };
    let result = MapCompiler::new(settings).compile(&dense_map(DimensionOrder::RowMajor), "dense");
    assert!(matches!(result, Err(CompileError::Transform(_))));
}

#[test]
fn test_compiled_map_checks_arguments() {
    let mut compiled = MapCompiler::default()
        .compile(&add_constant_map(), "checked")
        .unwrap();
    assert!(matches!(
        compiled.compute(&[]),
        Err(CompileError::Graph(GraphError::InputCountMismatch { expected: 1, found: 0 }))
    ));
    assert!(matches!(
        compiled.compute(&[HostData::from(vec![1i32, 2, 3])]),
        Err(CompileError::Graph(GraphError::PortTypeMismatch { .. }))
    ));
    assert!(matches!(
        compiled.compute(&[HostData::from(vec![1.0f32, 2.0])]),
        Err(CompileError::Graph(GraphError::PortSizeMismatch { .. }))
    ));
}

fn divide_by_constant(ty: ElementType, divisor: HostData) -> Map {
    let mut model = Model::new();
    let x = model.add_node(InputNode::new(ty, 3)).unwrap();
    let x_out = model.output(x, 0).unwrap();
    let d = model.add_node(ConstantNode::new(divisor)).unwrap();
    let d_out = model.output(d, 0).unwrap();
    let quotient = model
        .add_node(BinaryOperationNode::new(x_out, d_out, BinaryOperation::Divide))
        .unwrap();
    let y = model.output(quotient, 0).unwrap();
    Map::new(model, &[("x", x)], &[("y", y)]).unwrap()
}

#[test]
fn test_integer_division_overflow_wraps_in_both_modes() {
    let cases = [
        (
            divide_by_constant(ElementType::Int32, HostData::from(vec![-1i32])),
            HostData::from(vec![i32::MIN, 7, -9]),
            HostData::Int32(vec![i32::MIN, -7, 9]),
        ),
        (
            divide_by_constant(ElementType::Int64, HostData::from(vec![-1i64])),
            HostData::from(vec![i64::MIN, 7, -9]),
            HostData::Int64(vec![i64::MIN, -7, 9]),
        ),
        (
            divide_by_constant(ElementType::Int32, HostData::from(vec![2i32, -1, 3])),
            HostData::from(vec![i32::MIN, i32::MIN, -9]),
            HostData::Int32(vec![i32::MIN / 2, i32::MIN, -3]),
        ),
    ];
    for (mut map, input, expected) in cases {
        let input = [input];
        let mut compiled = MapCompiler::default().compile(&map, "divide").unwrap();
        assert_eq!(map.compute(&input).unwrap(), vec![expected.clone()]);
        assert_eq!(compiled.compute(&input).unwrap(), vec![expected]);
    }
}

#[test]
fn test_nan_operands_agree_in_both_modes() {
    let mut model = Model::new();
    let x = model.add_node(InputNode::new(ElementType::Float, 3)).unwrap();
    let x_out = model.output(x, 0).unwrap();
    let relu = model
        .add_node(UnaryOperationNode::new(x_out, UnaryOperation::Relu))
        .unwrap();
    let half = model.add_node(ConstantNode::new(vec![0.5f32])).unwrap();
    let half_out = model.output(half, 0).unwrap();
    let max = model
        .add_node(BinaryOperationNode::new(x_out, half_out, BinaryOperation::Max))
        .unwrap();
    let min = model
        .add_node(BinaryOperationNode::new(x_out, half_out, BinaryOperation::Min))
        .unwrap();
    let outputs = [
        ("relu", model.output(relu, 0).unwrap()),
        ("max", model.output(max, 0).unwrap()),
        ("min", model.output(min, 0).unwrap()),
    ];
    let mut map = Map::new(model, &[("x", x)], &outputs).unwrap();
    let mut compiled = MapCompiler::default().compile(&map, "nan").unwrap();

    let input = [HostData::from(vec![f32::NAN, 1.0, -2.0])];
    let expected = vec![
        HostData::Float(vec![0.0, 1.0, 0.0]),
        HostData::Float(vec![0.5, 1.0, 0.5]),
        HostData::Float(vec![0.5, 0.5, -2.0]),
    ];
    assert_eq!(map.compute(&input).unwrap(), expected);
    assert_eq!(compiled.compute(&input).unwrap(), expected);
}

#[test]
fn test_recompiling_after_drop() {
    let mut map = add_constant_map();
    let input = [HostData::from(vec![0.5f32, -0.5, 2.0])];
    let expected = map.compute(&input).unwrap();
    for _ in 0..8 {
        let mut compiled = MapCompiler::default().compile(&map, "add_five").unwrap();
        assert_eq!(compiled.compute(&input).unwrap(), expected);
    }
}
