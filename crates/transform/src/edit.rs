//! Single code-layout edits and their wire encoding.

use serde::{Deserialize, Serialize};

/// One reordering operation on functions or on basic blocks inside a named
/// function. Block positions are indices into the function's current block
/// order; position 0 (the entry block) is never touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "edit", rename_all = "snake_case")]
pub enum CodeLayoutEdit {
    SwapFunctions { a: String, b: String },
    MoveFunction { a: String, b: String },
    SwapBlocks { function: String, a: usize, b: usize },
    MoveBlock { function: String, from: usize, to: usize },
}

impl CodeLayoutEdit {
    /// Encode as one argument for the reorder tool: `-t<kind>,<a>,<b>`,
    /// where the kind is `s`/`m` for functions and `s<func>`/`m<func>` for
    /// blocks within `func`.
    pub fn as_arg(&self) -> String {
        match self {
            Self::SwapFunctions { a, b } => format!("-ts,{a},{b}"),
            Self::MoveFunction { a, b } => format!("-tm,{a},{b}"),
            Self::SwapBlocks { function, a, b } => format!("-ts{function},{a},{b}"),
            Self::MoveBlock { function, from, to } => format!("-tm{function},{from},{to}"),
        }
    }
}

/// Encode an edit sequence, one argument per edit, in order.
pub fn encode_edits(edits: &[CodeLayoutEdit]) -> Vec<String> {
    edits.iter().map(CodeLayoutEdit::as_arg).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_encodings() {
        let edits = [
            CodeLayoutEdit::SwapFunctions {
                a: "compute".into(),
                b: "update".into(),
            },
            CodeLayoutEdit::MoveFunction {
                a: "compute".into(),
                b: "main".into(),
            },
            CodeLayoutEdit::SwapBlocks {
                function: "compute".into(),
                a: 3,
                b: 4,
            },
            CodeLayoutEdit::MoveBlock {
                function: "compute".into(),
                from: 2,
                to: 7,
            },
        ];
        let args = encode_edits(&edits);
        assert_eq!(
            args,
            [
                "-ts,compute,update",
                "-tm,compute,main",
                "-tscompute,3,4",
                "-tmcompute,2,7",
            ]
        );
    }

    #[test]
    fn test_edit_serialization_round_trip() {
        let edit = CodeLayoutEdit::SwapBlocks {
            function: "compute".into(),
            a: 1,
            b: 2,
        };
        let json = serde_json::to_string(&edit).unwrap();
        let parsed: CodeLayoutEdit = serde_json::from_str(&json).unwrap();
        assert_eq!(edit, parsed);
    }
}
