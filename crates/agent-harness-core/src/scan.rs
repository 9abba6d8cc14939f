//! Block-expansion scanner.
//!
//! Grows a contiguous window of source lines around a trigger line so that
//! the exported snippet carries its surrounding call or statement. This is
//! a bounded, single-pass text heuristic, not a parser.
//!
//! # Algorithm
//!
//! 1. **Backward:** extend `start` over the non-blank paragraph that
//!    precedes the trigger.
//! 2. **Forward:** walk lines from `start`, tracking raw-literal
//!    (backtick), quoted-literal (`"`) and brace state. Once the trigger
//!    line has been reached and no literal is open, stop at the first of:
//!    a blank next line, a brace balance `<= 0`, or the length cap.
//!
//! Only `{` and `}` are counted. A call that spans several lines using
//! parentheses alone therefore collapses to its first matching line.
//!
//! # Example
//!
//! ```rust
//! use agent_harness_core::scan::{collect_blocks, Block, DEFAULT_MAX_BLOCK_LENGTH};
//!
//! let lines = ["a := 1", "", "db.Exec(ctx, func() {", "  run()", "})", "", "b := 2"];
//! let blocks = collect_blocks(&lines, &[2], DEFAULT_MAX_BLOCK_LENGTH);
//! assert_eq!(blocks, vec![Block { start: 2, end: 4 }]);
//! ```

use serde::Serialize;

/// Default cap on the number of lines in one block.
pub const DEFAULT_MAX_BLOCK_LENGTH: usize = 40;

/// Inclusive, zero-based line range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Block {
    pub start: usize,
    pub end: usize,
}

impl Block {
    /// Number of lines covered by the block.
    pub fn line_count(&self) -> usize {
        self.end - self.start + 1
    }
}

/// Literal and brace state carried across the lines of one block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanState {
    pub inside_raw: bool,
    pub inside_quoted: bool,
    pub brace_balance: i64,
}

impl ScanState {
    fn in_literal(&self) -> bool {
        self.inside_raw || self.inside_quoted
    }
}

/// Scan one line, returning the updated literal flags and the line's
/// brace delta.
///
/// A `//` outside both literals ends the line. The escape lookback for `"`
/// only looks at the previous character on the same line.
pub fn scan_line_state(line: &str, inside_raw: bool, inside_quoted: bool) -> (bool, bool, i64) {
    let chars: Vec<char> = line.chars().collect();
    let mut raw = inside_raw;
    let mut quoted = inside_quoted;
    let mut delta = 0i64;

    for (i, &ch) in chars.iter().enumerate() {
        if !raw && !quoted && ch == '/' && chars.get(i + 1) == Some(&'/') {
            break;
        }

        match ch {
            '`' if !quoted => raw = !raw,
            '"' if !raw => {
                let escaped = i > 0 && chars[i - 1] == '\\';
                if !escaped {
                    quoted = !quoted;
                }
            }
            '`' | '"' => {}
            '{' if !raw && !quoted => delta += 1,
            '}' if !raw && !quoted => delta -= 1,
            _ => {}
        }
    }

    (raw, quoted, delta)
}

/// Expand the trigger line at `trigger` into a [`Block`].
///
/// # Panics
///
/// Panics if `trigger >= lines.len()`. Callers only pass indices they
/// produced from the same `lines`.
pub fn expand_block<S: AsRef<str>>(lines: &[S], trigger: usize, max_block_length: usize) -> Block {
    assert!(trigger < lines.len(), "trigger index out of range");

    let mut start = trigger;
    while start > 0 && !lines[start - 1].as_ref().trim().is_empty() {
        start -= 1;
    }

    let mut state = ScanState::default();
    let mut end = trigger;

    for offset in start..lines.len() {
        let (raw, quoted, delta) =
            scan_line_state(lines[offset].as_ref(), state.inside_raw, state.inside_quoted);
        state.inside_raw = raw;
        state.inside_quoted = quoted;
        state.brace_balance += delta;
        end = offset;

        if state.in_literal() || offset < trigger {
            continue;
        }

        let boundary = lines
            .get(offset + 1)
            .map_or(true, |next| next.as_ref().trim().is_empty());
        let balance_reset = state.brace_balance <= 0;
        let length_exceeded = end - start + 1 >= max_block_length;

        if boundary || balance_reset || length_exceeded {
            break;
        }
    }

    Block { start, end }
}

/// Expand every trigger into a block, dropping blocks that would overlap
/// lines already claimed by an earlier block.
///
/// Triggers are processed in ascending order, so the result is ordered by
/// appearance in the source.
pub fn collect_blocks<S: AsRef<str>>(
    lines: &[S],
    triggers: &[usize],
    max_block_length: usize,
) -> Vec<Block> {
    let mut ordered = triggers.to_vec();
    ordered.sort_unstable();
    ordered.dedup();

    let mut claimed = vec![false; lines.len()];
    let mut blocks = Vec::new();

    for idx in ordered {
        if claimed[idx] {
            continue;
        }

        let block = expand_block(lines, idx, max_block_length);
        if claimed[block.start..=block.end].iter().any(|&c| c) {
            continue;
        }

        claimed[block.start..=block.end].fill(true);
        blocks.push(block);
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paren_only_call_collapses_to_trigger_line() {
        let lines = ["a := 1", "", "client.Exec(", "  query,", ")", "", "b := 2"];
        let block = expand_block(&lines, 2, DEFAULT_MAX_BLOCK_LENGTH);
        assert_eq!(block, Block { start: 2, end: 2 });
    }

    #[test]
    fn backward_extension_covers_paragraph() {
        let lines = ["", "x := 1", "y := 2", "db.Exec(ctx)", "", "z"];
        let block = expand_block(&lines, 3, DEFAULT_MAX_BLOCK_LENGTH);
        assert_eq!(block, Block { start: 1, end: 3 });
    }

    #[test]
    fn forward_extension_follows_braces() {
        let lines = [
            "err := db.Exec(ctx, func(tx Tx) error {",
            "    if ok {",
            "        return nil",
            "    }",
            "    return err",
            "})",
            "next := 1",
        ];
        let block = expand_block(&lines, 0, DEFAULT_MAX_BLOCK_LENGTH);
        assert_eq!(block, Block { start: 0, end: 5 });
    }

    #[test]
    fn blank_line_stops_open_block() {
        let lines = ["db.Run(func() {", "    a()", "", "    b()", "})"];
        let block = expand_block(&lines, 0, DEFAULT_MAX_BLOCK_LENGTH);
        assert_eq!(block, Block { start: 0, end: 1 });
    }

    #[test]
    fn trigger_on_last_line() {
        let lines = ["a {", "b {", "db.Exec({"];
        let block = expand_block(&lines, 2, DEFAULT_MAX_BLOCK_LENGTH);
        assert_eq!(block.end, 2);
        assert_eq!(block.start, 0);
    }

    #[test]
    fn single_line_input() {
        let lines = ["db.Exec(ctx)"];
        assert_eq!(
            expand_block(&lines, 0, DEFAULT_MAX_BLOCK_LENGTH),
            Block { start: 0, end: 0 }
        );
    }

    #[test]
    fn length_cap_bounds_unbalanced_block() {
        let lines: Vec<String> = (0..60).map(|i| format!("call{}({{", i)).collect();
        let block = expand_block(&lines, 0, DEFAULT_MAX_BLOCK_LENGTH);
        assert_eq!(block, Block { start: 0, end: 39 });
        assert_eq!(block.line_count(), DEFAULT_MAX_BLOCK_LENGTH);
    }

    #[test]
    fn length_cap_counts_from_start() {
        let lines: Vec<String> = (0..20).map(|i| format!("open{} {{", i)).collect();
        let block = expand_block(&lines, 5, 8);
        assert_eq!(block.start, 0);
        assert_eq!(block.end, 7);
    }

    #[test]
    fn result_is_in_bounds_for_every_trigger() {
        let lines = [
            "package main",
            "",
            "func f() {",
            "    q := `MATCH (n {id: $id})",
            "    RETURN n`",
            "    s := \"{\"",
            "    db.Exec(q) // {",
            "}",
            "",
            "x",
        ];
        for trigger in 0..lines.len() {
            let block = expand_block(&lines, trigger, DEFAULT_MAX_BLOCK_LENGTH);
            assert!(block.start <= trigger && trigger <= block.end);
            assert!(block.end < lines.len());
        }
    }

    #[test]
    fn expansion_is_deterministic() {
        let lines = ["a {", "  db.Exec(`x`)", "}", "", "b"];
        let first = expand_block(&lines, 1, DEFAULT_MAX_BLOCK_LENGTH);
        let second = expand_block(&lines, 1, DEFAULT_MAX_BLOCK_LENGTH);
        assert_eq!(first, second);
    }

    #[test]
    fn quoted_braces_are_ignored() {
        let (raw, quoted, delta) = scan_line_state("x := \"contains { and } braces\"", false, false);
        assert!(!raw);
        assert!(!quoted);
        assert_eq!(delta, 0);
    }

    #[test]
    fn escaped_quote_does_not_close_literal() {
        let (_, quoted, delta) = scan_line_state(r#"s := "a \" { still inside"#, false, false);
        assert!(quoted);
        assert_eq!(delta, 0);
    }

    #[test]
    fn escape_lookback_stays_on_line() {
        // Line 0 leaves a literal open and ends in `\`; line 1's leading `"`
        // still closes it, so the `{` after it counts.
        assert_eq!(scan_line_state("\" {", false, true), (false, false, 1));

        let lines = ["s := \"abc\\", "\" {", "x", "}", "", "y"];
        assert_eq!(expand_block(&lines, 0, 40), Block { start: 0, end: 3 });
    }

    #[test]
    fn line_comment_truncates_scan() {
        let (raw, quoted, delta) = scan_line_state("foo({ // } not a real brace", false, false);
        assert!(!raw);
        assert!(!quoted);
        assert_eq!(delta, 1);
    }

    #[test]
    fn comment_marker_inside_literal_is_text() {
        let (_, _, delta) = scan_line_state("u := \"http://x\" {", false, false);
        assert_eq!(delta, 1);
    }

    #[test]
    fn raw_literal_holds_block_open() {
        let lines = [
            "q := `",
            "MATCH (n) {",
            "RETURN n",
            "`",
            "",
            "db.Exec(q)",
        ];
        let block = expand_block(&lines, 0, DEFAULT_MAX_BLOCK_LENGTH);
        assert_eq!(block, Block { start: 0, end: 3 });
    }

    #[test]
    fn raw_literal_survives_blank_line() {
        let lines = ["q := `MATCH (n)", "", "RETURN n`", "x"];
        let block = expand_block(&lines, 0, DEFAULT_MAX_BLOCK_LENGTH);
        assert_eq!(block, Block { start: 0, end: 2 });
    }

    #[test]
    fn quote_inside_raw_literal_is_ignored() {
        let (raw, quoted, _) = scan_line_state("q := `say \"hi", false, false);
        assert!(raw);
        assert!(!quoted);
    }

    #[test]
    fn collect_blocks_never_overlap() {
        let lines = [
            "db.Exec(ctx, func() {",
            "    db.Run(x)",
            "})",
            "db.Cypher(y)",
            "",
            "db.Run(z)",
        ];
        let blocks = collect_blocks(&lines, &[0, 1, 3, 5], DEFAULT_MAX_BLOCK_LENGTH);
        for (i, a) in blocks.iter().enumerate() {
            for b in &blocks[i + 1..] {
                assert!(a.end < b.start || b.end < a.start, "{:?} overlaps {:?}", a, b);
            }
        }
        assert_eq!(
            blocks,
            vec![Block { start: 0, end: 2 }, Block { start: 5, end: 5 }]
        );
    }

    #[test]
    fn overlapping_block_is_dropped_not_merged() {
        // Trigger 2 is unclaimed but its backward paragraph reaches line 0.
        let lines = ["a()", "db.Run(x)", "db.Run(y)", ""];
        let blocks = collect_blocks(&lines, &[1, 2], DEFAULT_MAX_BLOCK_LENGTH);
        assert_eq!(blocks, vec![Block { start: 0, end: 1 }]);
    }

    #[test]
    fn collect_blocks_sorts_and_dedups_triggers() {
        let lines = ["db.Run(a)", "", "db.Run(b)", "", "db.Run(c)"];
        let blocks = collect_blocks(&lines, &[4, 0, 2, 2], DEFAULT_MAX_BLOCK_LENGTH);
        assert_eq!(
            blocks,
            vec![
                Block { start: 0, end: 0 },
                Block { start: 2, end: 2 },
                Block { start: 4, end: 4 },
            ]
        );
    }

    #[test]
    fn collect_blocks_empty_input() {
        let lines: [&str; 0] = [];
        assert!(collect_blocks(&lines, &[], DEFAULT_MAX_BLOCK_LENGTH).is_empty());
    }
}
