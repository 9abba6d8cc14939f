//! Trigger markers for the usage exporter.
//!
//! Decides which files are worth scanning and which lines inside them are
//! trigger lines for [`crate::scan::collect_blocks`]. Matching is plain
//! substring containment against fixed and configurable marker lists.

use serde::Deserialize;

/// Substrings that mark a single line as graph-query text.
pub const QUERY_LINE_INDICATORS: &[&str] = &[
    " MATCH ",
    "MATCH (",
    "OPTIONAL MATCH",
    "UNWIND ",
    "FOREACH ",
    "MERGE ",
    "MERGE(",
    "CALL ",
    "CALL{",
    "CALL(",
    "RETURN ",
    "CREATE ",
    "DETACH DELETE",
    "DELETE ",
    "SET ",
    "YIELD ",
    "APOC.",
    "apoc.",
];

/// Substrings that mark a whole file as containing graph queries.
pub const QUERY_CONTENT_INDICATORS: &[&str] = &[
    "MATCH ",
    "MERGE ",
    "CALL ",
    "UNWIND ",
    "RETURN ",
    "CREATE ",
    "DETACH DELETE",
    "DELETE ",
    "FOREACH ",
    "SET ",
    "YIELD ",
    "apoc.",
    "neo4jclient.ExecuteRead",
    "neo4jclient.ExecuteWrite",
    "ManagedTransaction",
];

/// Configurable marker lists.
///
/// `block_patterns` are call-site substrings checked against each raw
/// line. `library_markers` are import paths or identifiers that mark a Go
/// file as a database client user.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MarkerSet {
    pub block_patterns: Vec<String>,
    pub library_markers: Vec<String>,
}

impl Default for MarkerSet {
    fn default() -> Self {
        Self {
            block_patterns: [
                ".Exec(",
                ".ReadSession(",
                ".WriteSession(",
                ".ReadTransaction(",
                ".WriteTransaction(",
                ".RunWithParams(",
                ".Run(ctx",
                ".Run(",
                ".Cypher(",
                "begin().",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            library_markers: [
                "github.com/rlch/neogo",
                "github.com/rlch/neogo/db",
                "github.com/rlch/neogo/query",
                "github.com/MathGaps/neo4j-tooling",
                "github.com/MathGaps/neo4j-tooling/v2",
                "github.com/MathGaps/neo4j-tooling/v2/pkg/neo4jclient",
                "github.com/MathGaps/neo4j-tooling/v2/pkg/data/operations",
                "github.com/MathGaps/neo4j-tooling/v2/pkg/data/repositoryimpl",
                "github.com/MathGaps/neo4j-tooling/v2/pkg/domain",
                "github.com/neo4j/neo4j-go-driver/v5/neo4j",
                "neo4jclient.Execute",
                "query.Query",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl MarkerSet {
    /// Whether `line` is a trigger line.
    ///
    /// Blank lines and lines starting with `//` never match.
    pub fn line_has_pattern(&self, line: &str) -> bool {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with("//") {
            return false;
        }
        if self.block_patterns.iter().any(|p| line.contains(p.as_str())) {
            return true;
        }
        is_query_line(stripped)
    }

    /// Whether `content` references one of the library markers.
    pub fn uses_library(&self, content: &str) -> bool {
        self.library_markers
            .iter()
            .any(|m| content.contains(m.as_str()))
    }

    /// Whether a file with extension `ext` (without the dot) and the given
    /// content should be scanned for blocks.
    pub fn file_is_relevant(&self, ext: Option<&str>, content: &str) -> bool {
        match ext {
            Some("py") => false,
            Some("go") => self.uses_library(content) || contains_query_indicators(content),
            Some("cypher") => true,
            _ => contains_query_indicators(content),
        }
    }

    /// Indices of all trigger lines, ascending.
    pub fn find_triggers<S: AsRef<str>>(&self, lines: &[S]) -> Vec<usize> {
        lines
            .iter()
            .enumerate()
            .filter(|(_, line)| self.line_has_pattern(line.as_ref()))
            .map(|(idx, _)| idx)
            .collect()
    }
}

/// Whether `text` contains any file-level query indicator.
pub fn contains_query_indicators(text: &str) -> bool {
    QUERY_CONTENT_INDICATORS.iter().any(|i| text.contains(i))
}

/// Whether `line` contains any line-level query indicator.
pub fn is_query_line(line: &str) -> bool {
    QUERY_LINE_INDICATORS.iter().any(|i| line.contains(i))
}
