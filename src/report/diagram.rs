//! Mermaid flowchart of memory over time.
//!
//! One subgraph per sampled timestamp holding a node per active process and
//! a node for the total. Nodes of the same process are chained across
//! consecutive subgraphs; the totals are always chained.

use std::fmt;

use crate::metrics::{downsample_indices, MemoryHistory, SeriesKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeClass {
    Process,
    Total,
}

impl NodeClass {
    fn name(self) -> &'static str {
        match self {
            NodeClass::Process => "process",
            NodeClass::Total => "total",
        }
    }

    fn style(self) -> &'static str {
        match self {
            NodeClass::Process => "fill:#e8f1fb,stroke:#1f77b4,color:#0b3d62",
            NodeClass::Total => "fill:#fdecea,stroke:#d62728,color:#7f1d1d,font-weight:bold",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub label: String,
    pub class: NodeClass,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subgraph {
    pub id: String,
    pub title: String,
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Flowchart {
    pub subgraphs: Vec<Subgraph>,
    pub edges: Vec<Edge>,
}

/// Replaces every character that is not ASCII alphanumeric with `_`.
///
/// Distinct keys can collide, e.g. `1-a.b` and `1-a_b`.
pub fn sanitize_id(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn process_node_id(key: &SeriesKey, position: usize) -> String {
    format!("p{}_{}", sanitize_id(&key.to_string()), position)
}

fn total_node_id(position: usize) -> String {
    format!("total_{}", position)
}

impl Flowchart {
    /// Builds the diagram from the downsampled timeline of `history`.
    ///
    /// Totals are summed over every series, not only the drawn ones.
    pub fn from_history(history: &MemoryHistory) -> Self {
        let timeline = history.timeline();
        let picked: Vec<_> = downsample_indices(timeline.len())
            .into_iter()
            .map(|i| timeline[i])
            .collect();

        let mut chart = Flowchart::default();
        for (position, at) in picked.iter().enumerate() {
            let mut nodes = Vec::new();
            for (key, series) in history.series() {
                let Some(rss) = series.value_at(at) else {
                    continue;
                };
                nodes.push(Node {
                    id: process_node_id(key, position),
                    label: format!("{}<br/>{:.1} MB", key, rss),
                    class: NodeClass::Process,
                });

                let previous = position.checked_sub(1).map(|p| &picked[p]);
                if previous.is_some_and(|prev| series.value_at(prev).is_some()) {
                    chart.edges.push(Edge {
                        from: process_node_id(key, position - 1),
                        to: process_node_id(key, position),
                    });
                }
            }

            nodes.push(Node {
                id: total_node_id(position),
                label: format!("Total<br/>{:.1} MB", history.aggregate_at(at)),
                class: NodeClass::Total,
            });
            if position > 0 {
                chart.edges.push(Edge {
                    from: total_node_id(position - 1),
                    to: total_node_id(position),
                });
            }

            chart.subgraphs.push(Subgraph {
                id: format!("t{}", position),
                title: at.to_string(),
                nodes,
            });
        }
        chart
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.subgraphs.iter().flat_map(|s| s.nodes.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.subgraphs.is_empty()
    }

    fn ids_of(&self, class: NodeClass) -> Vec<&str> {
        self.nodes()
            .filter(|n| n.class == class)
            .map(|n| n.id.as_str())
            .collect()
    }
}

fn escape_label(label: &str) -> String {
    label.replace('"', "#quot;")
}

impl fmt::Display for Flowchart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "graph LR")?;
        if self.is_empty() {
            writeln!(f, "    %% no samples recorded")?;
        }

        for subgraph in &self.subgraphs {
            writeln!(f, "    subgraph {}[\"{}\"]", subgraph.id, escape_label(&subgraph.title))?;
            for node in &subgraph.nodes {
                writeln!(f, "        {}[\"{}\"]", node.id, escape_label(&node.label))?;
            }
            writeln!(f, "    end")?;
        }

        for edge in &self.edges {
            writeln!(f, "    {} --> {}", edge.from, edge.to)?;
        }

        for class in [NodeClass::Process, NodeClass::Total] {
            writeln!(f, "    classDef {} {}", class.name(), class.style())?;
        }
        for class in [NodeClass::Process, NodeClass::Total] {
            let ids = self.ids_of(class);
            if !ids.is_empty() {
                writeln!(f, "    class {} {}", ids.join(","), class.name())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const HEADER: &str = "Starting memory monitor at now\nElapsed_Time | PID | Name | Heap_Used_MB | Heap_Capacity_MB | RSS_MB\n";

    fn history(lines: &[&str]) -> MemoryHistory {
        MemoryHistory::parse(&format!("{}{}\n", HEADER, lines.join("\n")))
    }

    fn edge(from: &str, to: &str) -> Edge {
        Edge {
            from: from.into(),
            to: to.into(),
        }
    }

    #[test]
    fn sanitizes_node_ids() {
        assert_eq!(sanitize_id("101-DaemonA"), "101_DaemonA");
        assert_eq!(sanitize_id("7-a.b c"), "7_a_b_c");
        // Known collision.
        assert_eq!(sanitize_id("1-a.b"), sanitize_id("1-a_b"));
    }

    #[test]
    fn empty_history_renders_a_valid_header() {
        let chart = Flowchart::from_history(&MemoryHistory::default());
        assert!(chart.is_empty());
        let text = chart.to_string();
        assert!(text.starts_with("graph LR\n"));
        assert!(!text.contains("\n    class "));
    }

    #[test]
    fn edges_skip_gaps_but_totals_do_not() {
        let h = history(&[
            "00:00:00 | 101 | DaemonA | 1MB | 1MB | 100.0MB",
            "00:00:00 | 202 | DaemonB | 1MB | 1MB | 50.0MB",
            "00:00:05 | 101 | DaemonA | 1MB | 1MB | 150.0MB",
            "00:00:10 | 101 | DaemonA | 1MB | 1MB | 200.0MB",
            "00:00:10 | 202 | DaemonB | 1MB | 1MB | 60.0MB",
        ]);
        let chart = Flowchart::from_history(&h);

        assert_eq!(chart.subgraphs.len(), 3);
        assert_eq!(
            chart.edges,
            vec![
                edge("p101_DaemonA_0", "p101_DaemonA_1"),
                edge("total_0", "total_1"),
                edge("p101_DaemonA_1", "p101_DaemonA_2"),
                edge("total_1", "total_2"),
            ]
        );
        let middle: Vec<&str> = chart.subgraphs[1].nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(middle, vec!["p101_DaemonA_1", "total_1"]);
    }

    #[test]
    fn renders_mermaid() {
        let h = history(&[
            "00:00:00 | 101 | DaemonA | 1MB | 1MB | 100.0MB",
            "00:00:05 | 101 | DaemonA | 1MB | 1MB | 150.0MB",
        ]);
        let text = Flowchart::from_history(&h).to_string();
        assert_eq!(
            text,
            "graph LR\n\
             \x20   subgraph t0[\"00:00:00\"]\n\
             \x20       p101_DaemonA_0[\"101-DaemonA<br/>100.0 MB\"]\n\
             \x20       total_0[\"Total<br/>100.0 MB\"]\n\
             \x20   end\n\
             \x20   subgraph t1[\"00:00:05\"]\n\
             \x20       p101_DaemonA_1[\"101-DaemonA<br/>150.0 MB\"]\n\
             \x20       total_1[\"Total<br/>150.0 MB\"]\n\
             \x20   end\n\
             \x20   p101_DaemonA_0 --> p101_DaemonA_1\n\
             \x20   total_0 --> total_1\n\
             \x20   classDef process fill:#e8f1fb,stroke:#1f77b4,color:#0b3d62\n\
             \x20   classDef total fill:#fdecea,stroke:#d62728,color:#7f1d1d,font-weight:bold\n\
             \x20   class p101_DaemonA_0,p101_DaemonA_1 process\n\
             \x20   class total_0,total_1 total\n"
        );
    }

    #[test]
    fn long_runs_are_downsampled_with_full_totals() {
        let mut lines = Vec::new();
        for i in 0..50u64 {
            lines.push(format!("{} | 1 | DaemonA | 1MB | 1MB | 10.0MB", crate::metrics::Elapsed::from_secs(i * 5)));
            if i % 3 != 0 {
                // never on a drawn timestamp
                lines.push(format!("{} | 2 | DaemonB | 1MB | 1MB | 5.0MB", crate::metrics::Elapsed::from_secs(i * 5)));
            }
        }
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let chart = Flowchart::from_history(&history(&refs));

        // 50 points, stride 3.
        assert_eq!(chart.subgraphs.len(), 17);
        assert_eq!(chart.subgraphs[1].title, "00:00:15");
        assert!(chart.nodes().all(|n| !n.id.contains("DaemonB")));
        assert_eq!(chart.edges.len(), 2 * 16);
    }

    #[test]
    fn series_totals_use_every_series() {
        let h = history(&[
            "00:00:00 | 1 | DaemonA | 1MB | 1MB | 10.0MB",
            "00:00:00 | 2 | DaemonB | 1MB | 1MB | 5.5MB",
        ]);
        let chart = Flowchart::from_history(&h);
        let total = chart.nodes().find(|n| n.class == NodeClass::Total).unwrap();
        assert_eq!(total.label, "Total<br/>15.5 MB");
    }
}
