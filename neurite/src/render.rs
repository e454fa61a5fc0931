use super::Morphology;

use graphviz_rust::{
    cmd::{CommandArg, Format},
    dot_structures::{
        Attribute, Edge, EdgeTy, Graph, GraphAttributes, Id, Node, NodeId, Stmt, Vertex,
    },
    exec,
    printer::PrinterContext,
};

pub fn to_neato_png(morphology: &Morphology) -> std::io::Result<Vec<u8>> {
    let mut g = Graph::Graph {
        id: Id::Plain("morphology".to_string()),
        strict: false,
        stmts: Vec::new(),
    };

    g.add_stmt(Stmt::GAttribute(GraphAttributes::Graph(vec![
        Attribute(Id::Plain("layout".into()), Id::Plain("neato".into())),
        Attribute(Id::Plain("overlap".into()), Id::Plain("false".into())),
        Attribute(Id::Plain("splines".into()), Id::Plain("line".into())),
        Attribute(Id::Plain("mode".into()), Id::Plain("sgd".into())),
    ])));

    for i in 0..morphology.node_count() {
        let node_id = NodeId(Id::Plain(format!("n{}", i)), None);
        // open terminals drawn as rings, interior compartments as dots
        let shape = if morphology.is_boundary(i) {
            "circle"
        } else {
            "point"
        };
        let node = Node::new(
            node_id.clone(),
            vec![Attribute(
                Id::Plain("shape".into()),
                Id::Plain(shape.into()),
            )],
        );
        g.add_stmt(Stmt::Node(node));

        for &tgt in morphology.neighbors(i) {
            // undirected adjacency stores each edge twice; emit it once
            if (tgt as usize) <= i {
                continue;
            }

            let edge = Edge {
                ty: EdgeTy::Pair(
                    Vertex::N(node_id.clone()),
                    Vertex::N(NodeId(Id::Plain(format!("n{}", tgt)), None)),
                ),
                attributes: Vec::new(),
            };

            g.add_stmt(Stmt::Edge(edge));
        }
    }

    let mut ctx = PrinterContext::default();
    exec(g, &mut ctx, vec![CommandArg::Format(Format::Png)])
}
