use crate::symbols::{suggested_action, DeadCodeItem, DependencyNode, Diagnostic};
use serde::Serialize;
use std::cmp::Reverse;

/// The results document consumed by external collaborators. Field and
/// item order are deterministic; two runs on the same input produce
/// byte-identical output.
#[derive(Debug, Serialize)]
pub struct Report {
    pub summary: Summary,
    pub items: Vec<DeadCodeItem>,
    /// Qualified names treated as reachability roots.
    pub entrypoints: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Serialize)]
pub struct Summary {
    /// Items with confidence >= 80.
    pub high: usize,
    /// Items with confidence in 50..=79.
    pub medium: usize,
    /// Items with confidence < 50.
    pub low: usize,
    pub total: usize,
    pub orphaned_files: usize,
}

/// Builds the report from scored nodes. Pure with respect to its
/// inputs; sorting is (confidence desc, file, line, qualified name).
pub fn build_report(
    nodes: Vec<DependencyNode>,
    mut entrypoints: Vec<String>,
    orphaned_files: usize,
    mut diagnostics: Vec<Diagnostic>,
) -> Report {
    let mut items: Vec<DeadCodeItem> = nodes
        .into_iter()
        .map(|node| DeadCodeItem {
            qualified_name: node.symbol.qualified_name.clone(),
            name: node.symbol.name.clone(),
            item_type: node.symbol.kind.item_type(),
            file: node.symbol.location.file.clone(),
            line: node.symbol.location.line,
            decorators: node.symbol.decorators.clone(),
            confidence: node.confidence,
            reasons: node.reasons,
            suggested_action: suggested_action(node.confidence),
        })
        .collect();

    items.sort_by(|a, b| {
        (Reverse(a.confidence), &a.file, a.line, &a.qualified_name).cmp(&(
            Reverse(b.confidence),
            &b.file,
            b.line,
            &b.qualified_name,
        ))
    });

    let mut summary = Summary {
        high: 0,
        medium: 0,
        low: 0,
        total: items.len(),
        orphaned_files,
    };
    for item in &items {
        if item.confidence >= 80 {
            summary.high += 1;
        } else if item.confidence >= 50 {
            summary.medium += 1;
        } else {
            summary.low += 1;
        }
    }

    entrypoints.sort();
    entrypoints.dedup();
    diagnostics.sort();

    Report {
        summary,
        items,
        entrypoints,
        diagnostics,
    }
}

impl Report {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::{Location, Symbol, SymbolKind};

    fn node(qname: &str, confidence: u8, line: usize) -> DependencyNode {
        DependencyNode {
            symbol: Symbol {
                qualified_name: qname.to_string(),
                name: qname.rsplit('.').next().unwrap().to_string(),
                kind: SymbolKind::Function,
                location: Location {
                    file: "app.py".to_string(),
                    line,
                    col: 0,
                },
                decorators: Vec::new(),
                is_entrypoint: false,
                entrypoint_reasons: Vec::new(),
                parent_class: None,
                parent_class_bases: Vec::new(),
                noqa_codes: Default::default(),
                dynamic_risk: false,
            },
            confidence,
            reachable: false,
            reasons: vec!["Base confidence for function: +60".to_string()],
            usage_count: 0,
        }
    }

    #[test]
    fn test_item_ordering_and_bands() {
        let report = build_report(
            vec![
                node("app.low", 10, 5),
                node("app.high", 95, 9),
                node("app.mid", 60, 2),
            ],
            vec!["app.index".to_string()],
            0,
            Vec::new(),
        );
        let order: Vec<&str> = report
            .items
            .iter()
            .map(|i| i.qualified_name.as_str())
            .collect();
        assert_eq!(order, vec!["app.high", "app.mid", "app.low"]);
        assert_eq!(report.summary.high, 1);
        assert_eq!(report.summary.medium, 1);
        assert_eq!(report.summary.low, 1);
        assert_eq!(report.summary.total, 3);
    }

    #[test]
    fn test_same_confidence_sorted_by_position() {
        let report = build_report(
            vec![node("app.b", 80, 9), node("app.a", 80, 2)],
            Vec::new(),
            0,
            Vec::new(),
        );
        assert_eq!(report.items[0].qualified_name, "app.a");
        assert_eq!(report.items[0].suggested_action, "delete");
    }
}
