//! 上下文数据的传输编码
//!
//! 格式：`d|k:v|k2:v2||u|k:v`
//! - 段之间以 `||` 分隔，段首字符为数据方向标签（`d` 下行，`u` 上行）；
//! - 值为紧凑 JSON 文本；
//! - 键或值包含分隔符 `|`、`:`（或键为空）时写作 `:base64(key):base64(value)`。
//!
//! 仅编码 `DataScope::AcrossTransports` 的条目。
//!
use super::data::{ContextData, DataScope};
use crate::error::{DispatchError, DispatchResult};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

pub(crate) const DOWNSTREAM_TAG: char = 'd';
pub(crate) const UPSTREAM_TAG: char = 'u';

/// 解码出的一条数据：（方向标签，键，值）
pub(crate) type DecodedEntry = (char, String, Value);

fn needs_escaping(s: &str) -> bool {
    s.is_empty() || s.contains('|') || s.contains(':')
}

/// 将若干张表按标签编码；没有任何可传输条目时返回 `None`
pub(crate) fn encode(sections: &[(char, &ContextData)]) -> Option<String> {
    let mut out = String::new();

    for (tag, data) in sections {
        let mut tagged = false;

        for entry in data
            .entries()
            .into_iter()
            .filter(|e| e.scope == DataScope::AcrossTransports)
        {
            if !tagged {
                if !out.is_empty() {
                    out.push_str("||");
                }
                out.push(*tag);
                tagged = true;
            }

            out.push('|');

            let value = entry.value.to_string();
            if needs_escaping(&entry.key) || needs_escaping(&value) {
                out.push(':');
                out.push_str(&STANDARD.encode(entry.key.as_bytes()));
                out.push(':');
                out.push_str(&STANDARD.encode(value.as_bytes()));
            } else {
                out.push_str(&entry.key);
                out.push(':');
                out.push_str(&value);
            }
        }
    }

    (!out.is_empty()).then_some(out)
}

pub(crate) fn decode(encoded: &str) -> DispatchResult<Vec<DecodedEntry>> {
    let mut out = Vec::new();
    if encoded.is_empty() {
        return Ok(out);
    }

    for section in encoded.split("||") {
        let mut parts = section.split('|');

        let tag = match parts.next().unwrap_or_default() {
            "d" => DOWNSTREAM_TAG,
            "u" => UPSTREAM_TAG,
            other => {
                return Err(DispatchError::InvalidContextData {
                    reason: format!("unknown context data section tag: {other:?}"),
                });
            }
        };

        for part in parts {
            let (key, value) = match part.strip_prefix(':') {
                Some(escaped) => {
                    let (k, v) = split_pair(escaped)?;
                    (
                        String::from_utf8(STANDARD.decode(k)?)?,
                        String::from_utf8(STANDARD.decode(v)?)?,
                    )
                }
                None => {
                    let (k, v) = split_pair(part)?;
                    (k.to_string(), v.to_string())
                }
            };

            out.push((tag, key, serde_json::from_str(&value)?));
        }
    }

    Ok(out)
}

fn split_pair(part: &str) -> DispatchResult<(&str, &str)> {
    part.split_once(':')
        .ok_or_else(|| DispatchError::InvalidContextData {
            reason: format!("missing key/value separator in entry: {part}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_entries_are_written_verbatim() {
        let down = ContextData::new();
        down.set("tenant", 7);
        let up = ContextData::new();
        up.set("hops", 2);

        let encoded = encode(&[(DOWNSTREAM_TAG, &down), (UPSTREAM_TAG, &up)]).unwrap();
        assert_eq!(encoded, "d|tenant:7||u|hops:2");
    }

    #[test]
    fn delimiter_entries_survive_round_trip() {
        let down = ContextData::new();
        down.set("a|b", "x:y");
        down.set("", json!({"nested": [1, 2]}));
        down.set("plain", true);

        let encoded = encode(&[(DOWNSTREAM_TAG, &down)]).unwrap();
        let mut decoded = decode(&encoded).unwrap();
        decoded.sort_by(|a, b| a.1.cmp(&b.1));

        assert_eq!(
            decoded,
            vec![
                ('d', "".to_string(), json!({"nested": [1, 2]})),
                ('d', "a|b".to_string(), json!("x:y")),
                ('d', "plain".to_string(), json!(true)),
            ]
        );
    }

    #[test]
    fn in_process_entries_are_not_encoded() {
        let down = ContextData::new();
        down.set_scoped("secret", "s", DataScope::InProcess);
        assert_eq!(encode(&[(DOWNSTREAM_TAG, &down)]), None);
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(decode("").unwrap().is_empty());
        assert!(matches!(
            decode("x|k:1"),
            Err(DispatchError::InvalidContextData { .. })
        ));
        assert!(matches!(
            decode("d|novalue"),
            Err(DispatchError::InvalidContextData { .. })
        ));
        assert!(matches!(
            decode("d|:!!!:!!!"),
            Err(DispatchError::InvalidContextData { .. })
        ));
    }
}
