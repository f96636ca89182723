//! Client command scripts
//!
//! One command per line:
//!
//! ```text
//! LOAD <path>                  # store the file at <path>, read relative to the script
//! APPEND <filename> <content>  # append the rest of the line to a loaded file
//! DELETE <filename>
//! LIST
//! ```
//!
//! Keywords are case-insensitive. Blank lines and lines starting with `#` are skipped.

use anyhow::{anyhow, bail, Context, Result};
use std::fs;
use std::path::Path;

/// A client operation, before file names are resolved to file ids
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ClientOp {
    Load { filename: String, content: String },
    Append { filename: String, content: String },
    Delete { filename: String },
    List,
}

/// Read and parse a script file
pub fn load_script(path: impl AsRef<Path>) -> Result<Vec<ClientOp>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read command file {}", path.display()))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    parse_script(&text, base_dir).with_context(|| format!("in command file {}", path.display()))
}

/// Parse script text; `LOAD` paths are resolved against `base_dir`
pub fn parse_script(text: &str, base_dir: &Path) -> Result<Vec<ClientOp>> {
    let mut ops = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let op = parse_line(line, base_dir).with_context(|| format!("line {}", number + 1))?;
        ops.push(op);
    }
    Ok(ops)
}

fn parse_line(line: &str, base_dir: &Path) -> Result<ClientOp> {
    let (keyword, rest) = match line.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (line, ""),
    };

    match keyword.to_uppercase().as_str() {
        "LOAD" => {
            if rest.is_empty() {
                bail!("LOAD requires a file path: LOAD <path>");
            }
            let content = fs::read_to_string(base_dir.join(rest))
                .with_context(|| format!("cannot read file to load: {rest}"))?;
            Ok(ClientOp::Load {
                filename: rest.to_string(),
                content,
            })
        }
        "APPEND" => {
            let (filename, content) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| anyhow!("APPEND requires a file name and content: APPEND <filename> <content>"))?;
            Ok(ClientOp::Append {
                filename: filename.to_string(),
                content: content.trim_start().to_string(),
            })
        }
        "DELETE" => match rest.split_whitespace().collect::<Vec<_>>().as_slice() {
            [filename] => Ok(ClientOp::Delete {
                filename: filename.to_string(),
            }),
            _ => bail!("DELETE requires exactly one file name: DELETE <filename>"),
        },
        "LIST" if rest.is_empty() => Ok(ClientOp::List),
        "LIST" => bail!("LIST takes no argument"),
        other => bail!("unknown command: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_script() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.txt"), "hello\n").unwrap();

        let script = "\
# setup
LOAD a.txt
append a.txt more words here

list
Delete a.txt
";
        let ops = parse_script(script, temp_dir.path()).unwrap();
        assert_eq!(
            ops,
            vec![
                ClientOp::Load {
                    filename: "a.txt".to_string(),
                    content: "hello\n".to_string()
                },
                ClientOp::Append {
                    filename: "a.txt".to_string(),
                    content: "more words here".to_string()
                },
                ClientOp::List,
                ClientOp::Delete {
                    filename: "a.txt".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_malformed_lines() {
        let dir = Path::new(".");
        assert!(parse_script("LOAD", dir).is_err());
        assert!(parse_script("APPEND a.txt", dir).is_err());
        assert!(parse_script("DELETE", dir).is_err());
        assert!(parse_script("DELETE a b", dir).is_err());
        assert!(parse_script("LIST everything", dir).is_err());
        assert!(parse_script("COPY a b", dir).is_err());
    }

    #[test]
    fn test_missing_load_target() {
        let temp_dir = TempDir::new().unwrap();
        let err = parse_script("LIST\nLOAD nope.txt", temp_dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn test_load_script_resolves_relative_to_script() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("data.txt"), "x").unwrap();
        let script = temp_dir.path().join("client.cmds");
        fs::write(&script, "LOAD data.txt\n").unwrap();

        let ops = load_script(&script).unwrap();
        assert_eq!(
            ops,
            vec![ClientOp::Load {
                filename: "data.txt".to_string(),
                content: "x".to_string()
            }]
        );
    }
}
