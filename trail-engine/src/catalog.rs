//! Trail catalog - the static, ordered graph of sections and nodes
//!
//! Sections and the node order inside them define the single canonical
//! traversal sequence (the "trail"). The catalog never changes at runtime;
//! sessions share it behind an `Arc`.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::TrailError;

/// Route used when a node has no dedicated screen
pub const DEFAULT_ROUTE: &str = "/trilha";

/// Kind of activity a node represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Reading lesson, completed directly
    Lesson,
    /// Scored activity (quiz, challenge)
    Game,
}

/// A single lesson or scored activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailNode {
    pub id: String,
    pub kind: NodeKind,
    pub title: String,
    pub display_icon: String,
}

impl TrailNode {
    pub fn new(
        id: impl Into<String>,
        kind: NodeKind,
        title: impl Into<String>,
        display_icon: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            title: title.into(),
            display_icon: display_icon.into(),
        }
    }
}

/// An ordered group of nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailSection {
    pub id: String,
    pub title: String,
    pub nodes: Vec<TrailNode>,
}

impl TrailSection {
    pub fn new(id: impl Into<String>, title: impl Into<String>, nodes: Vec<TrailNode>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            nodes,
        }
    }
}

/// Location of a node inside the trail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodePosition {
    pub section_index: usize,
    pub node_index: usize,
}

/// Immutable trail catalog
#[derive(Debug, Clone)]
pub struct Catalog {
    sections: Vec<TrailSection>,
    positions: HashMap<String, NodePosition>,
    routes: HashMap<String, String>,
}

impl Catalog {
    /// Build a catalog, rejecting empty trails, empty sections and duplicate ids
    pub fn new(sections: Vec<TrailSection>) -> Result<Self, TrailError> {
        if sections.is_empty() {
            return Err(TrailError::InvalidCatalog("trail has no sections".to_string()));
        }

        let mut section_ids = HashSet::new();
        let mut positions = HashMap::new();

        for (section_index, section) in sections.iter().enumerate() {
            if !section_ids.insert(section.id.as_str()) {
                return Err(TrailError::InvalidCatalog(format!(
                    "duplicate section id: {}",
                    section.id
                )));
            }
            if section.nodes.is_empty() {
                return Err(TrailError::InvalidCatalog(format!(
                    "section {} has no nodes",
                    section.id
                )));
            }
            for (node_index, node) in section.nodes.iter().enumerate() {
                let previous = positions.insert(
                    node.id.clone(),
                    NodePosition { section_index, node_index },
                );
                if previous.is_some() {
                    return Err(TrailError::InvalidCatalog(format!(
                        "duplicate node id: {}",
                        node.id
                    )));
                }
            }
        }

        Ok(Self {
            sections,
            positions,
            routes: HashMap::new(),
        })
    }

    /// Attach the static id -> route table used by `route_for`
    pub fn with_routes<I, K, V>(mut self, routes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.routes = routes
            .into_iter()
            .map(|(id, route)| (id.into(), route.into()))
            .collect();
        self
    }

    /// The trail shipped with the app: three sections of five nodes each
    pub fn standard() -> Self {
        use NodeKind::{Game, Lesson};

        let sections = vec![
            TrailSection::new(
                "sec1",
                "Introdução à Gestão Financeira 💰",
                vec![
                    TrailNode::new("sec1-n1", Lesson, "Por que cuidar do seu dinheiro é <strong>importante</strong>?", "🧠"),
                    TrailNode::new("sec1-n2", Game, "Quiz: \"Você sabe lidar com dinheiro?\"", "🎯"),
                    TrailNode::new("sec1-n3", Lesson, "Como a educação financeira muda sua vida", "💡"),
                    TrailNode::new("sec1-n4", Game, "Desafio dos Erros Financeiros", "⚖️"),
                    TrailNode::new("sec1-n5", Lesson, "Passos simples para começar hoje!", "👣"),
                ],
            ),
            TrailSection::new(
                "sec2",
                "Orçamento 📒",
                vec![
                    TrailNode::new("sec2-n1", Lesson, "O que é orçamento e como ele te ajuda!", "💰"),
                    TrailNode::new("sec2-n2", Game, "Monte seu orçamento ideal", "🧩"),
                    TrailNode::new("sec2-n3", Lesson, "Como dividir seu dinheiro com sabedoria", "🧾"),
                    TrailNode::new("sec2-n4", Game, "Desafio do fim do mês", "⏳"),
                    TrailNode::new("sec2-n5", Lesson, "Ferramentas simples para planejar seu mês", "🛠️"),
                ],
            ),
            TrailSection::new(
                "sec3",
                "Controle de Gastos 📊",
                vec![
                    TrailNode::new("sec3-n1", Lesson, "Por onde o dinheiro escapa", "🕳️"),
                    TrailNode::new("sec3-n2", Game, "Caça aos vilões do orçamento", "🕵️‍♂️"),
                    TrailNode::new("sec3-n3", Lesson, "A importância de anotar tudo", "✍️"),
                    TrailNode::new("sec3-n4", Game, "Jogo do corte inteligente", "✂️"),
                    TrailNode::new("sec3-n5", Lesson, "Dicas para economizar sem sofrer", "🌱"),
                ],
            ),
        ];

        let routes = [
            ("sec1-n1", "/trilha/Introducao"),
            ("sec1-n2", "/trilha/quiz-dinheiro"),
            ("sec1-n3", "/trilha/educacao-financeira"),
            ("sec1-n4", "/trilha/reserva"),
            ("sec1-n5", "/trilha/passos-simples"),
            ("sec2-n1", "/trilha/orcamento"),
            ("sec2-n2", "/trilha/monte-orcamento"),
            ("sec2-n3", "/trilha/orcamento-dicas"),
            ("sec2-n4", "/trilha/desafio-fim-mes"),
            ("sec2-n5", "/trilha/ferramentas-planejamento"),
        ];

        Self::from_trusted(sections).with_routes(routes)
    }

    /// Index sections that are already known to be valid
    fn from_trusted(sections: Vec<TrailSection>) -> Self {
        let positions = sections
            .iter()
            .enumerate()
            .flat_map(|(section_index, section)| {
                section.nodes.iter().enumerate().map(move |(node_index, node)| {
                    (node.id.clone(), NodePosition { section_index, node_index })
                })
            })
            .collect();

        Self {
            sections,
            positions,
            routes: HashMap::new(),
        }
    }

    pub fn sections(&self) -> &[TrailSection] {
        &self.sections
    }

    pub fn section(&self, index: usize) -> Option<&TrailSection> {
        self.sections.get(index)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    pub fn position(&self, id: &str) -> Option<NodePosition> {
        self.positions.get(id).copied()
    }

    pub fn find_node(&self, id: &str) -> Option<&TrailNode> {
        let pos = self.position(id)?;
        self.sections
            .get(pos.section_index)
            .and_then(|s| s.nodes.get(pos.node_index))
    }

    /// First node of the first section; always reachable
    pub fn first_node(&self) -> &TrailNode {
        &self.sections[0].nodes[0]
    }

    /// All nodes in trail order
    pub fn nodes(&self) -> impl Iterator<Item = &TrailNode> + '_ {
        self.sections.iter().flat_map(|s| s.nodes.iter())
    }

    pub fn node_count(&self) -> usize {
        self.positions.len()
    }

    /// Screen route for a node, falling back to the trail overview
    pub fn route_for(&self, id: &str) -> &str {
        self.routes.get(id).map(String::as_str).unwrap_or(DEFAULT_ROUTE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_layout() {
        let catalog = Catalog::standard();
        assert_eq!(catalog.sections().len(), 3);
        assert_eq!(catalog.node_count(), 15);
        assert_eq!(catalog.first_node().id, "sec1-n1");
        assert!(Catalog::new(catalog.sections().to_vec()).is_ok());

        let kinds: Vec<NodeKind> = catalog.sections()[0].nodes.iter().map(|n| n.kind).collect();
        assert_eq!(
            kinds,
            vec![NodeKind::Lesson, NodeKind::Game, NodeKind::Lesson, NodeKind::Game, NodeKind::Lesson]
        );
    }

    #[test]
    fn test_position_and_find() {
        let catalog = Catalog::standard();
        assert_eq!(
            catalog.position("sec2-n3"),
            Some(NodePosition { section_index: 1, node_index: 2 })
        );
        assert_eq!(catalog.find_node("sec3-n2").map(|n| n.kind), Some(NodeKind::Game));
        assert!(catalog.find_node("sec9-n1").is_none());
        assert!(!catalog.contains("nope"));
    }

    #[test]
    fn test_trail_order() {
        let catalog = Catalog::standard();
        let ids: Vec<&str> = catalog.nodes().map(|n| n.id.as_str()).collect();
        assert_eq!(ids.first(), Some(&"sec1-n1"));
        assert_eq!(ids[5], "sec2-n1");
        assert_eq!(ids.last(), Some(&"sec3-n5"));
    }

    #[test]
    fn test_route_for_falls_back() {
        let catalog = Catalog::standard();
        assert_eq!(catalog.route_for("sec1-n2"), "/trilha/quiz-dinheiro");
        assert_eq!(catalog.route_for("sec3-n1"), DEFAULT_ROUTE);
        assert_eq!(catalog.route_for("unknown"), DEFAULT_ROUTE);
    }

    #[test]
    fn test_rejects_invalid_catalogs() {
        assert!(matches!(Catalog::new(vec![]), Err(TrailError::InvalidCatalog(_))));

        let empty_section = TrailSection::new("s", "Empty", vec![]);
        assert!(Catalog::new(vec![empty_section]).is_err());

        let dup = TrailSection::new(
            "s",
            "Dup",
            vec![
                TrailNode::new("a", NodeKind::Lesson, "A", "*"),
                TrailNode::new("a", NodeKind::Game, "A again", "*"),
            ],
        );
        assert!(Catalog::new(vec![dup]).is_err());
    }
}
