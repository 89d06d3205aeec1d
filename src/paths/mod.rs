pub mod path_graph;
pub mod path_tree;
