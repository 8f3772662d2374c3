use std::io::Write;

use serde::Deserialize;

use super::{Node, Writer};
use crate::error::Result;

/// Parse a multi-document YAML (or JSON) stream, skipping empty documents
pub fn parse_documents(text: &str) -> Result<Vec<Node>> {
    let mut nodes = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let node = Node::deserialize(document)?;
        if !node.is_null() {
            nodes.push(node);
        }
    }
    Ok(nodes)
}

/// Writes nodes as a `---` separated YAML stream
pub struct YamlWriter<W> {
    out: W,
}

impl<W: Write> YamlWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Writer for YamlWriter<W> {
    fn write(&mut self, nodes: Vec<Node>) -> Result<()> {
        for (i, node) in nodes.iter().enumerate() {
            if i > 0 {
                self.out.write_all(b"---\n")?;
            }
            self.out.write_all(serde_yaml::to_string(node)?.as_bytes())?;
        }
        self.out.flush()?;
        Ok(())
    }
}
