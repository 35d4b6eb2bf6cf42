//! Turns an [`hookaudit_ir::interface::SourceLoc`] into the `"<file>:<row>"` strings
//! the detect-mode JSON output's `source_location` field uses.
//!
//! Neither `Contract` nor `SourceLoc` carry file names, only the numeric
//! `sources[file].id` solc assigns per compilation unit; this module is the one place
//! that closes the loop back to a path a human can open.

use std::collections::HashMap;

use hookaudit_interface::SourceLoc;
use serde_json::Value;

/// Maps a solc source-file index back to its path, and (if the original source text
/// was supplied) resolves a byte offset within that file to a 1-based source row.
pub struct SourceResolver {
    file_names: HashMap<u32, String>,
    file_contents: HashMap<u32, String>,
}

impl SourceResolver {
    /// `compiler_output` is the standard-output JSON's top-level `sources` map
    /// (`{file: {id, ...}}`); `std_input_json`, if given, is the standard-input JSON
    /// whose `sources[file].content` lets row numbers be computed instead of omitted.
    #[must_use]
    pub fn new(compiler_output: &Value, std_input_json: Option<&Value>) -> Self {
        let mut file_names = HashMap::new();
        if let Some(sources) = compiler_output.get("sources").and_then(Value::as_object) {
            for (file, entry) in sources {
                if let Some(id) = entry.get("id").and_then(Value::as_u64) {
                    file_names.insert(id as u32, file.clone());
                }
            }
        }

        let mut file_contents = HashMap::new();
        if let Some(sources) = std_input_json.and_then(|v| v.get("sources")).and_then(Value::as_object) {
            for (file, entry) in sources {
                let Some(&id) = file_names.iter().find_map(|(id, name)| (name == file).then_some(id)) else {
                    continue;
                };
                if let Some(content) = entry.get("content").and_then(Value::as_str) {
                    file_contents.insert(id, content.to_string());
                }
            }
        }

        Self { file_names, file_contents }
    }

    /// `<file>:<row>` when the file is known and its content was supplied; just
    /// `<file>` when the row can't be computed; `"<unknown>"` when the file index
    /// itself doesn't resolve.
    #[must_use]
    pub fn render(&self, loc: SourceLoc) -> String {
        let Some(file) = self.file_names.get(&loc.file_index) else {
            return "<unknown>".to_string();
        };
        match self.file_contents.get(&loc.file_index) {
            Some(content) => format!("{file}:{}", row_at(content, loc.start as usize)),
            None => file.clone(),
        }
    }
}

fn row_at(content: &str, byte_offset: usize) -> usize {
    let offset = byte_offset.min(content.len());
    content.as_bytes()[..offset].iter().filter(|&&b| b == b'\n').count() + 1
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use serde_json::json;

    #[test]
    fn renders_file_and_row_when_content_is_known() {
        let output = json!({ "sources": { "A.sol": { "id": 0 } } });
        let input = json!({ "sources": { "A.sol": { "content": "line one\nline two\nline three" } } });
        let resolver = SourceResolver::new(&output, Some(&input));
        let loc = SourceLoc { file_index: 0, start: 10, len: 4 };
        assert_eq!(resolver.render(loc), "A.sol:2");
    }

    #[test]
    fn falls_back_to_file_name_without_content() {
        let output = json!({ "sources": { "A.sol": { "id": 0 } } });
        let resolver = SourceResolver::new(&output, None);
        let loc = SourceLoc { file_index: 0, start: 0, len: 1 };
        assert_eq!(resolver.render(loc), "A.sol");
    }

    #[test]
    fn unknown_file_index_renders_placeholder() {
        let output = json!({ "sources": { "A.sol": { "id": 0 } } });
        let resolver = SourceResolver::new(&output, None);
        let loc = SourceLoc { file_index: 7, start: 0, len: 1 };
        assert_eq!(resolver.render(loc), "<unknown>");
    }
}
