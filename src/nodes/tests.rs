use float_cmp::approx_eq;

use super::*;
use crate::error::GraphError;
use crate::graph::{Map, Model, ModelId, Node, NodeBehavior, NodeFamily, NodeVariant, PortRef};
use crate::value::{
    BinaryOperation, DimensionOrder, ElementType, HostData, ImmediateContext, UnaryOperation,
    Vector,
};

fn port(ty: ElementType, size: usize) -> PortRef {
    let mut model = Model::new();
    let id = model.add_node(InputNode::new(ty, size)).unwrap();
    model.output(id, 0).unwrap()
}

fn floats(values: &[f32]) -> Vector {
    Vector::from_data(values.to_vec())
}

#[test]
fn binary_operation_broadcasts_single_element_rhs() {
    let mut ctx = ImmediateContext::new();
    let node = BinaryOperationNode::new(
        port(ElementType::Float, 3),
        port(ElementType::Float, 1),
        BinaryOperation::Multiply,
    );
    assert!(node.validate().is_ok());
    let lhs = floats(&[1.0, 2.0, 3.0]);
    let result = node.evaluate(&mut ctx, &lhs, &floats(&[2.0])).unwrap();
    assert_eq!(result.to_host_data().unwrap(), HostData::Float(vec![2.0, 4.0, 6.0]));
    assert_eq!(lhs.to_host_data().unwrap(), HostData::Float(vec![1.0, 2.0, 3.0]));
}

#[test]
fn binary_operation_elementwise() {
    let mut ctx = ImmediateContext::new();
    let node = BinaryOperationNode::new(
        port(ElementType::Float, 2),
        port(ElementType::Float, 2),
        BinaryOperation::Max,
    );
    let result = node
        .evaluate(&mut ctx, &floats(&[1.0, 5.0]), &floats(&[3.0, 4.0]))
        .unwrap();
    assert_eq!(result.to_host_data().unwrap(), HostData::Float(vec![3.0, 5.0]));
}

#[test]
fn integer_division_by_zero_surfaces() {
    let mut node = BinaryOperationNode::new(
        port(ElementType::Int32, 2),
        port(ElementType::Int32, 2),
        BinaryOperation::Divide,
    );
    let mut ctx = ImmediateContext::new();
    let inputs = [
        Vector::from_data(vec![4i32, 9]),
        Vector::from_data(vec![2i32, 0]),
    ];
    assert!(matches!(
        node.compute(&mut ctx, &inputs, None),
        Err(GraphError::Value(crate::error::ValueError::DivideByZero))
    ));
}

#[test]
fn matrix_vector_product_honours_dimension_order() {
    let mut ctx = ImmediateContext::new();
    let input = floats(&[1.0, 10.0]);
    let mut row_major = MatrixVectorProductNode::new(
        port(ElementType::Float, 2),
        vec![1.0f32, 2.0, 3.0, 4.0],
        2,
        2,
        DimensionOrder::RowMajor,
    );
    let mut column_major = MatrixVectorProductNode {
        order: DimensionOrder::ColumnMajor,
        ..row_major.clone()
    };

    let rows = row_major.compute(&mut ctx, &[input.clone()], None).unwrap();
    let columns = column_major.compute(&mut ctx, &[input], None).unwrap();
    assert_eq!(rows[0].to_host_data().unwrap(), HostData::Float(vec![21.0, 43.0]));
    assert_eq!(columns[0].to_host_data().unwrap(), HostData::Float(vec![31.0, 42.0]));
}

#[test]
fn matrix_vector_product_checks_shapes() {
    let node = MatrixVectorProductNode::new(
        port(ElementType::Float, 3),
        vec![0.0f32; 4],
        2,
        2,
        DimensionOrder::RowMajor,
    );
    assert!(matches!(node.validate(), Err(GraphError::PortSizeMismatch { .. })));

    let node = MatrixVectorProductNode::new(
        port(ElementType::Double, 2),
        vec![0.0f32; 4],
        2,
        2,
        DimensionOrder::RowMajor,
    );
    assert!(matches!(node.validate(), Err(GraphError::PortTypeMismatch { .. })));
}

#[test]
fn unary_operation_does_not_touch_its_input() {
    let mut ctx = ImmediateContext::new();
    let node = UnaryOperationNode::new(port(ElementType::Float, 3), UnaryOperation::Square);
    let input = floats(&[-2.0, 0.5, 3.0]);
    let result = node.evaluate(&mut ctx, &input).unwrap();
    let squared = result.to_host_data().unwrap();
    let expected = [4.0f32, 0.25, 9.0];
    for (a, b) in squared.as_f32().unwrap().iter().zip(expected) {
        assert!(approx_eq!(f32, *a, b, ulps = 2));
    }
    assert_eq!(input.to_host_data().unwrap(), HostData::Float(vec![-2.0, 0.5, 3.0]));
}

#[test]
fn boolean_ports_have_no_arithmetic() {
    let node = UnaryOperationNode::new(port(ElementType::Boolean, 2), UnaryOperation::Abs);
    assert!(node.validate().is_err());
    let node = AccumulatorNode::new(port(ElementType::Boolean, 2));
    assert!(node.validate().is_err());
}

#[test]
fn accumulator_keeps_a_running_sum() {
    let mut ctx = ImmediateContext::new();
    let mut node = AccumulatorNode::new(port(ElementType::Float, 2));
    assert!(node.has_state());
    for _ in 0..3 {
        node.compute(&mut ctx, &[floats(&[1.0, -0.5])], None).unwrap();
    }
    assert_eq!(node.state, HostData::Float(vec![3.0, -1.5]));
    node.reset();
    assert_eq!(node.state, HostData::Float(vec![0.0, 0.0]));
}

#[test]
fn input_node_checks_supplied_data() {
    let mut ctx = ImmediateContext::new();
    let mut node = InputNode::new(ElementType::Int32, 2);
    assert!(matches!(
        node.compute(&mut ctx, &[], Some(&HostData::from(vec![1i32, 2, 3]))),
        Err(GraphError::PortSizeMismatch { .. })
    ));
    assert!(matches!(
        node.compute(&mut ctx, &[], Some(&HostData::from(vec![1i64, 2]))),
        Err(GraphError::PortTypeMismatch { .. })
    ));
    assert!(node.compute(&mut ctx, &[], None).is_err());
}

#[test]
fn bias_and_dense_compute_directly() {
    let mut ctx = ImmediateContext::new();
    let mut bias = BiasNode::new(port(ElementType::Double, 2), vec![1.0f64, -1.0]);
    assert!(!bias.is_primitive());
    let out = bias
        .compute(&mut ctx, &[Vector::from_data(vec![0.5f64, 0.5])], None)
        .unwrap();
    assert_eq!(out[0].to_host_data().unwrap(), HostData::Double(vec![1.5, -0.5]));

    let mut dense = FullyConnectedNode::new(
        port(ElementType::Double, 2),
        vec![1.0f64, 0.0, 0.0, 1.0, 1.0, 1.0],
        vec![0.0f64, 0.0, -10.0],
        3,
        2,
    )
    .with_activation(UnaryOperation::Abs);
    assert!(dense.validate().is_ok());
    let out = dense
        .compute(&mut ctx, &[Vector::from_data(vec![2.0f64, -3.0])], None)
        .unwrap();
    assert_eq!(out[0].to_host_data().unwrap(), HostData::Double(vec![2.0, 3.0, 11.0]));
}

#[test]
fn dense_shapes_are_validated() {
    let dense = FullyConnectedNode::new(
        port(ElementType::Float, 2),
        vec![0.0f32; 6],
        vec![0.0f32; 2],
        3,
        2,
    );
    assert!(matches!(
        dense.validate(),
        Err(GraphError::PortSizeMismatch { ref port, .. }) if port == "bias"
    ));
}

#[test]
fn sub_model_delegates_to_its_map() {
    let mut inner = Model::new();
    let x = inner.add_node(InputNode::new(ElementType::Int32, 2)).unwrap();
    let x_out = inner.output(x, 0).unwrap();
    let doubled = inner
        .add_node(BinaryOperationNode::new(x_out, x_out, BinaryOperation::Add))
        .unwrap();
    let y = inner.output(doubled, 0).unwrap();
    let map = Map::new(inner, &[("x", x)], &[("y", y)]).unwrap();

    let mut node = SubModelNode::new(map, &[port(ElementType::Int32, 2)]);
    assert!(node.validate().is_ok());
    assert!(node.is_primitive());
    assert_eq!(node.outputs()[0].name, "y");

    let mut ctx = ImmediateContext::new();
    let out = node
        .compute(&mut ctx, &[Vector::from_data(vec![3i32, -4])], None)
        .unwrap();
    assert_eq!(out[0].to_host_data().unwrap(), HostData::Int32(vec![6, -8]));

    let mismatched = SubModelNode::new(node.map().clone(), &[port(ElementType::Int32, 3)]);
    assert!(matches!(
        mismatched.validate(),
        Err(GraphError::PortSizeMismatch { .. })
    ));
}

#[test]
fn nodes_round_trip_through_serde() {
    let node: Node = FullyConnectedNode::new(
        port(ElementType::Float, 2),
        vec![1.0f32, 2.0],
        vec![0.0f32],
        1,
        2,
    )
    .with_activation(UnaryOperation::Relu)
    .into();
    let json = serde_json::to_string(&node).unwrap();
    let back: Node = serde_json::from_str(&json).unwrap();
    assert_eq!(back.family(), NodeFamily::FullyConnected);
    assert_eq!(serde_json::to_string(&back).unwrap(), json);

    // A lone node has no model to rebind its inputs to.
    let back = FullyConnectedNode::from_node(&back).unwrap();
    assert_eq!(back.input.sources[0].model, ModelId::default());
    assert!(back.validate().is_ok());
}
