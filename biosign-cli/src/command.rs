//! Parsing of command lines typed into the host
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use biosign_core::channel::{SIGNATURE_ARGUMENT, VERIFY_SIGNATURE};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Forward to the method channel
    Invoke { method: String, args: Value },
    Help,
    Quit,
    Empty,
}

/// Parse `<method> [argument]`.
///
/// The argument is either a JSON object passed through as the channel
/// arguments, or, for `verifySignature`, a bare hex signature.
pub fn parse(line: &str) -> Result<Command, serde_json::Error> {
    let line = line.trim();
    let (method, rest) = match line.split_once(char::is_whitespace) {
        Some((method, rest)) => (method, rest.trim()),
        None => (line, ""),
    };

    let command = match method {
        "" => Command::Empty,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => {
            let args = if rest.is_empty() {
                Value::Null
            } else if rest.starts_with('{') {
                serde_json::from_str(rest)?
            } else if method == VERIFY_SIGNATURE {
                json!({ SIGNATURE_ARGUMENT: rest })
            } else {
                Value::String(rest.to_string())
            };
            Command::Invoke {
                method: method.to_string(),
                args,
            }
        }
    };
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_method() {
        assert_eq!(
            parse("ensureKey").unwrap(),
            Command::Invoke {
                method: "ensureKey".to_string(),
                args: Value::Null,
            }
        );
    }

    #[test]
    fn test_parse_bare_signature() {
        assert_eq!(
            parse("verifySignature  0a0b ").unwrap(),
            Command::Invoke {
                method: "verifySignature".to_string(),
                args: json!({ "signedKeyInput": "0a0b" }),
            }
        );
    }

    #[test]
    fn test_parse_json_arguments() {
        assert_eq!(
            parse(r#"verifySignature {"signedKeyInput": "ff"}"#).unwrap(),
            Command::Invoke {
                method: "verifySignature".to_string(),
                args: json!({ "signedKeyInput": "ff" }),
            }
        );
        assert!(parse("verifySignature {broken").is_err());
    }

    #[test]
    fn test_parse_builtins() {
        assert_eq!(parse("   ").unwrap(), Command::Empty);
        assert_eq!(parse("help").unwrap(), Command::Help);
        assert_eq!(parse("exit").unwrap(), Command::Quit);
    }
}
