use std::collections::HashMap;

use super::*;
use crate::error::{GraphError, TransformError, ValueError};
use crate::nodes::{
    AccumulatorNode, BinaryOperationNode, ConstantNode, FullyConnectedNode, InputNode, OutputNode,
    UnaryOperationNode,
};
use crate::value::{BinaryOperation, ElementType, HostData, UnaryOperation};

/// input(3) + constant([5]) -> output
fn add_constant_model() -> (Model, NodeId, NodeId) {
    let mut model = Model::new();
    let input = model.add_node(InputNode::new(ElementType::Float, 3)).unwrap();
    let five = model.add_node(ConstantNode::new(vec![5.0f32])).unwrap();
    let x = model.output(input, 0).unwrap();
    let c = model.output(five, 0).unwrap();
    let add = model
        .add_node(BinaryOperationNode::new(x, c, BinaryOperation::Add))
        .unwrap();
    let sum = model.output(add, 0).unwrap();
    let output = model.add_node(OutputNode::new(sum)).unwrap();
    (model, input, output)
}

/// input(3) -> fully connected 2x3 with relu -> output
fn dense_model() -> (Model, NodeId, NodeId, NodeId) {
    let mut model = Model::new();
    let input = model.add_node(InputNode::new(ElementType::Float, 3)).unwrap();
    let x = model.output(input, 0).unwrap();
    let dense = model
        .add_node(
            FullyConnectedNode::new(
                x,
                vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0],
                vec![0.5f32, -100.0],
                2,
                3,
            )
            .with_activation(UnaryOperation::Relu),
        )
        .unwrap();
    let y = model.output(dense, 0).unwrap();
    let output = model.add_node(OutputNode::new(y)).unwrap();
    (model, input, dense, output)
}

fn run(model: &mut Model, input: NodeId, data: HostData, output: NodeId) -> HostData {
    let inputs = HashMap::from([(input, data)]);
    let mut values = model.compute(&inputs).unwrap();
    values.remove(&(output, 0)).unwrap()
}

fn families(model: &Model) -> Vec<NodeFamily> {
    model
        .topological_order()
        .unwrap()
        .into_iter()
        .map(|id| model.node(id).unwrap().family())
        .collect()
}

#[test]
fn test_add_constant_compute() {
    let (mut model, input, output) = add_constant_model();
    let result = run(&mut model, input, HostData::from(vec![1.0f32, 2.0, 3.0]), output);
    assert_eq!(result, HostData::Float(vec![6.0, 7.0, 8.0]));
}

#[test]
fn test_topological_order_follows_insertion_order() {
    let mut model = Model::new();
    let a = model.add_node(InputNode::new(ElementType::Int32, 2)).unwrap();
    let b = model.add_node(ConstantNode::new(vec![1i32, 2])).unwrap();
    let b_out = model.output(b, 0).unwrap();
    let c = model
        .add_node(UnaryOperationNode::new(b_out, UnaryOperation::Negate))
        .unwrap();
    let a_out = model.output(a, 0).unwrap();
    let d = model.add_node(OutputNode::new(a_out)).unwrap();

    let order = model.topological_order().unwrap();
    assert_eq!(order, vec![a, b, c, d]);

    let position: HashMap<NodeId, usize> =
        order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    for &id in &order {
        for dependency in model.dependencies(id) {
            assert!(position[&dependency] < position[&id]);
        }
    }

    assert_eq!(model.visit_ancestors(c).unwrap(), vec![b, c]);
    assert_eq!(model.visit_ancestors(d).unwrap(), vec![a, d]);
}

#[test]
fn test_nodes_iterator_is_restartable() {
    let (model, input, _) = add_constant_model();
    let nodes = model.nodes();
    assert_eq!(nodes.clone().count(), 4);
    assert_eq!(nodes.map(|(id, _)| id).next(), Some(input));

    let constants: Vec<_> = model.nodes_by_type::<ConstantNode>().collect();
    assert_eq!(constants.len(), 1);
    assert_eq!(constants[0].1.values, HostData::Float(vec![5.0]));
}

#[test]
fn test_downcast_reports_both_families() {
    let (model, input, _) = add_constant_model();
    assert!(model.node_as::<InputNode>(input).is_ok());
    match model.node_as::<ConstantNode>(input) {
        Err(GraphError::NodeTypeMismatch { expected, found }) => {
            assert_eq!(expected, NodeFamily::Constant);
            assert_eq!(found, NodeFamily::Input);
        }
        other => panic!("expected a type mismatch, got {:?}", other),
    }
}

#[test]
fn test_add_node_rejects_bad_ports() {
    let mut model = Model::new();
    let ints = model.add_node(InputNode::new(ElementType::Int32, 3)).unwrap();
    let floats = model.add_node(ConstantNode::new(vec![1.0f32, 2.0, 3.0])).unwrap();
    let pair = model.add_node(ConstantNode::new(vec![1i32, 2])).unwrap();
    let x = model.output(ints, 0).unwrap();
    let f = model.output(floats, 0).unwrap();
    let p = model.output(pair, 0).unwrap();

    let mixed = model.add_node(BinaryOperationNode::new(x, f, BinaryOperation::Add));
    assert!(matches!(mixed, Err(GraphError::PortTypeMismatch { .. })));

    let short = model.add_node(BinaryOperationNode::new(x, p, BinaryOperation::Add));
    assert!(matches!(short, Err(GraphError::PortSizeMismatch { .. })));

    let mut stretched = x;
    stretched.size = 4;
    let lying = model.add_node(UnaryOperationNode::new(stretched, UnaryOperation::Abs));
    assert!(matches!(lying, Err(GraphError::PortSizeMismatch { .. })));

    let dangling = PortRef { index: 3, ..x };
    let unresolved = model.add_node(OutputNode::new(dangling));
    assert!(matches!(
        unresolved,
        Err(GraphError::UnresolvedPort { index: 3, .. })
    ));

    let root = model.add_node(UnaryOperationNode::new(x, UnaryOperation::Sqrt));
    assert!(matches!(
        root,
        Err(GraphError::Value(ValueError::UnsupportedOperation { .. }))
    ));

    let empty = model.add_node(ConstantNode::new(Vec::<f64>::new()));
    assert!(matches!(empty, Err(GraphError::EmptyPort { .. })));

    assert_eq!(model.len(), 3);
    assert!(model.validate().is_ok());
}

#[test]
fn test_ports_from_another_model_do_not_resolve() {
    let (source, input, _) = add_constant_model();
    let foreign = source.output(input, 0).unwrap();

    let mut model = Model::new();
    let local = model.add_node(InputNode::new(ElementType::Float, 3)).unwrap();
    assert_eq!(local, foreign.node);
    assert_ne!(model.output(local, 0).unwrap(), foreign);
    let result = model.add_node(OutputNode::new(foreign));
    assert!(matches!(result, Err(GraphError::UnresolvedPort { .. })));
    assert_eq!(model.len(), 1);

    let clone = source.clone();
    assert_eq!(clone.id(), source.id());
    assert_eq!(clone.output(input, 0).unwrap(), foreign);
}

#[test]
fn test_concatenated_input() {
    let mut model = Model::new();
    let input = model.add_node(InputNode::new(ElementType::Double, 2)).unwrap();
    let tail = model.add_node(ConstantNode::new(vec![10.0f64, 20.0, 30.0])).unwrap();
    let x = model.output(input, 0).unwrap();
    let t = model.output(tail, 0).unwrap();
    let negate = model
        .add_node(UnaryOperationNode {
            input: InputPort::concat("input", &[x, t]).unwrap(),
            operation: UnaryOperation::Negate,
        })
        .unwrap();
    assert_eq!(model.output(negate, 0).unwrap().size, 5);

    let result = run(&mut model, input, HostData::from(vec![1.0f64, 2.0]), negate);
    assert_eq!(
        result,
        HostData::Double(vec![-1.0, -2.0, -10.0, -20.0, -30.0])
    );
}

#[test]
fn test_missing_input_data() {
    let (mut model, _, _) = add_constant_model();
    assert!(matches!(
        model.compute(&HashMap::new()),
        Err(GraphError::MissingInput(_))
    ));
}

#[test]
fn test_copy_preserves_computation() {
    let (mut model, input, output) = add_constant_model();
    let mut transformer = ModelTransformer::default();
    let (mut copy, ports) = transformer.copy_model(&model).unwrap();
    assert_eq!(copy.len(), model.len());
    assert_eq!(families(&copy), families(&model));

    let new_input = ports.get(&model.output(input, 0).unwrap()).unwrap().node;
    let new_output = ports.get(&model.output(output, 0).unwrap()).unwrap().node;
    assert_eq!(ports.origin(new_output), Some(output));

    let data = HostData::from(vec![-1.0f32, 0.0, 1.5]);
    assert_eq!(
        run(&mut model, input, data.clone(), output),
        run(&mut copy, new_input, data, new_output)
    );
}

#[test]
fn test_refine_expands_composites_until_fixed_point() {
    let (mut model, input, dense, output) = dense_model();
    assert!(!model.is_refined());

    let mut transformer = ModelTransformer::default();
    let (mut refined, ports) = transformer.refine_model(&model).unwrap();
    assert!(refined.is_refined());
    assert_eq!(
        families(&refined),
        vec![
            NodeFamily::Input,
            NodeFamily::MatrixVectorProduct,
            NodeFamily::Constant,
            NodeFamily::BinaryOperation,
            NodeFamily::UnaryOperation,
            NodeFamily::Output,
        ]
    );
    for (id, node) in refined.nodes() {
        if !matches!(node.family(), NodeFamily::Input | NodeFamily::Output) {
            assert_eq!(ports.origin(id), Some(dense));
        }
    }

    let new_input = ports.get(&model.output(input, 0).unwrap()).unwrap().node;
    let new_output = ports.get(&model.output(output, 0).unwrap()).unwrap().node;
    let data = HostData::from(vec![1.0f32, 1.0, 1.0]);
    let expected = run(&mut model, input, data.clone(), output);
    assert_eq!(expected, HostData::Float(vec![6.5, 0.0]));
    assert_eq!(run(&mut refined, new_input, data, new_output), expected);
}

#[test]
fn test_refine_is_idempotent_at_fixed_point() {
    let (model, ..) = dense_model();
    let mut transformer = ModelTransformer::default();
    let (once, _) = transformer.refine_model(&model).unwrap();
    let (twice, _) = transformer.refine_model(&once).unwrap();
    assert_eq!(families(&once), families(&twice));
    assert_eq!(once.to_string().lines().count(), twice.to_string().lines().count());
}

#[test]
fn test_refinement_limit() {
    let (model, ..) = dense_model();
    for limit in [0, 1] {
        let mut transformer = ModelTransformer::new(TransformContext {
            max_refinement_iterations: limit,
        });
        assert!(matches!(
            transformer.refine_model(&model),
            Err(TransformError::RefinementLimitExceeded { iterations }) if iterations == limit
        ));
    }

    let (primitive, ..) = add_constant_model();
    let mut transformer = ModelTransformer::new(TransformContext {
        max_refinement_iterations: 0,
    });
    let (same, _) = transformer.refine_model(&primitive).unwrap();
    assert_eq!(families(&same), families(&primitive));
}

#[test]
fn test_transformer_rejects_unmapped_and_incompatible_ports() {
    let (model, input, _) = add_constant_model();
    let port = model.output(input, 0).unwrap();

    let mut transformer = ModelTransformer::default();
    assert!(matches!(
        transformer.transform_input(&InputPort::new("x", port)),
        Err(TransformError::UnmappedSource { .. })
    ));
    assert!(transformer.corresponding_port(&port).is_err());

    let constant = transformer
        .add_node(ConstantNode::new(vec![1.0f32, 2.0]))
        .unwrap();
    let replacement = transformer.output(constant, 0).unwrap();
    assert!(matches!(
        transformer.map_output(port, replacement),
        Err(TransformError::IncompatiblePorts { .. })
    ));
}

#[test]
fn test_stateful_reset_matches_fresh_node() {
    let build = || {
        let mut model = Model::new();
        let input = model.add_node(InputNode::new(ElementType::Int64, 2)).unwrap();
        let x = model.output(input, 0).unwrap();
        let sum = model.add_node(AccumulatorNode::new(x)).unwrap();
        (model, input, sum)
    };

    let (mut model, input, sum) = build();
    assert!(model.has_state());
    let data = HostData::from(vec![1i64, 2]);
    assert_eq!(run(&mut model, input, data.clone(), sum), HostData::Int64(vec![1, 2]));
    assert_eq!(run(&mut model, input, data.clone(), sum), HostData::Int64(vec![2, 4]));

    model.reset();
    let (mut fresh, fresh_input, fresh_sum) = build();
    assert_eq!(
        run(&mut model, input, data.clone(), sum),
        run(&mut fresh, fresh_input, data, fresh_sum)
    );
}

#[test]
fn test_map_bindings_are_validated() {
    let (model, input, output) = add_constant_model();
    let result = model.output(output, 0).unwrap();

    let map = Map::new(model.clone(), &[("x", input)], &[("y", result)]).unwrap();
    assert_eq!(map.inputs()[0].size, 3);

    assert!(matches!(
        Map::new(model.clone(), &[("x", output)], &[("y", result)]),
        Err(GraphError::NodeTypeMismatch { .. })
    ));
    assert!(matches!(
        Map::new(model.clone(), &[], &[("y", result)]),
        Err(GraphError::MissingInput(_))
    ));
    assert!(matches!(
        Map::new(model.clone(), &[("x", input)], &[("x", result)]),
        Err(GraphError::InvalidMapBinding { .. })
    ));

    let mut map = map;
    assert!(matches!(
        map.compute(&[]),
        Err(GraphError::InputCountMismatch { expected: 1, found: 0 })
    ));
}

#[test]
fn test_map_copy_and_refine_keep_bindings() {
    let (model, input, _, output) = dense_model();
    let y = model.output(output, 0).unwrap();
    let mut map = Map::new(model, &[("x", input)], &[("y", y)]).unwrap();

    let mut copy = map.copy().unwrap();
    let mut refined = map.refine(&TransformContext::default()).unwrap();
    assert!(refined.model().is_refined());

    let data = [HostData::from(vec![0.0f32, 1.0, -1.0])];
    let expected = map.compute(&data).unwrap();
    assert_eq!(copy.compute(&data).unwrap(), expected);
    assert_eq!(refined.compute(&data).unwrap(), expected);
}

#[test]
fn test_display_lists_nodes_in_order() {
    let (model, ..) = add_constant_model();
    let text = model.to_string();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].contains("Input"));
    assert!(lines[2].contains("BinaryOperation"));
    assert!(lines[2].contains("lhs: "));
}
