// Copyright 2026 BadCompany
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

//! `protokoll://` resource URIs.
//!
//! The grammar is a fixed contract with the server:
//!
//! ```text
//! protokoll://transcripts?directory=<dir>&limit=<n>&offset=<n>
//! protokoll://transcript/<path>
//! protokoll://entities/<type>
//! protokoll://entity/<type>/<id>
//! protokoll://config
//! ```

use std::fmt;
use std::str::FromStr;

use crate::core::constants::uri;
use crate::core::errors::CodecError;

/// Query for the transcripts listing resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptQuery {
    pub directory: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl TranscriptQuery {
    pub fn new(directory: impl Into<String>) -> Self {
        Self {
            directory: Some(directory.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceUri {
    Transcripts(TranscriptQuery),
    Transcript { path: String },
    Entities { entity_type: String },
    Entity { entity_type: String, id: String },
    Config,
}

impl fmt::Display for ResourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(uri::SCHEME)?;
        match self {
            ResourceUri::Transcripts(query) => {
                f.write_str(uri::TRANSCRIPTS)?;
                let mut params = Vec::new();
                if let Some(dir) = &query.directory {
                    params.push(format!("directory={}", encode_component(dir)));
                }
                if let Some(limit) = query.limit {
                    params.push(format!("limit={limit}"));
                }
                if let Some(offset) = query.offset {
                    params.push(format!("offset={offset}"));
                }
                if !params.is_empty() {
                    write!(f, "?{}", params.join("&"))?;
                }
                Ok(())
            }
            ResourceUri::Transcript { path } => {
                write!(f, "{}/{}", uri::TRANSCRIPT, encode_component(path))
            }
            ResourceUri::Entities { entity_type } => {
                write!(f, "{}/{}", uri::ENTITIES, encode_component(entity_type))
            }
            ResourceUri::Entity { entity_type, id } => write!(
                f,
                "{}/{}/{}",
                uri::ENTITY,
                encode_component(entity_type),
                encode_component(id)
            ),
            ResourceUri::Config => f.write_str(uri::CONFIG),
        }
    }
}

impl FromStr for ResourceUri {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CodecError::Decode(format!("not a protokoll resource URI: {s}"));
        let rest = s.strip_prefix(uri::SCHEME).ok_or_else(invalid)?;

        if rest == uri::CONFIG {
            return Ok(ResourceUri::Config);
        }

        if let Some(after) = rest.strip_prefix(uri::TRANSCRIPTS) {
            if !after.is_empty() && !after.starts_with('?') {
                return Err(invalid());
            }
            let mut query = TranscriptQuery::default();
            for pair in after.trim_start_matches('?').split('&').filter(|p| !p.is_empty()) {
                let (key, value) = pair.split_once('=').ok_or_else(invalid)?;
                match key {
                    "directory" => query.directory = Some(decode_component(value)?),
                    "limit" => query.limit = Some(value.parse().map_err(|_| invalid())?),
                    "offset" => query.offset = Some(value.parse().map_err(|_| invalid())?),
                    _ => return Err(invalid()),
                }
            }
            return Ok(ResourceUri::Transcripts(query));
        }

        let (kind, tail) = rest.split_once('/').ok_or_else(invalid)?;
        match kind {
            uri::TRANSCRIPT if !tail.is_empty() => Ok(ResourceUri::Transcript {
                path: decode_component(tail)?,
            }),
            uri::ENTITIES if !tail.is_empty() && !tail.contains('/') => Ok(ResourceUri::Entities {
                entity_type: decode_component(tail)?,
            }),
            uri::ENTITY => {
                let (entity_type, id) = tail.split_once('/').ok_or_else(invalid)?;
                if entity_type.is_empty() || id.is_empty() {
                    return Err(invalid());
                }
                Ok(ResourceUri::Entity {
                    entity_type: decode_component(entity_type)?,
                    id: decode_component(id)?,
                })
            }
            _ => Err(invalid()),
        }
    }
}

/// Percent-encode everything except RFC 3986 unreserved characters and `/`.
fn encode_component(raw: &str) -> String {
    urlencoding::encode(raw).replace("%2F", "/")
}

fn decode_component(encoded: &str) -> Result<String, CodecError> {
    urlencoding::decode(encoded)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| CodecError::Decode(format!("bad percent-escape in {encoded}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcripts_uri_matches_grammar() {
        let uri = ResourceUri::Transcripts(TranscriptQuery::new("/output").limit(50).offset(0));
        assert_eq!(
            uri.to_string(),
            "protokoll://transcripts?directory=/output&limit=50&offset=0"
        );
    }

    #[test]
    fn transcripts_uri_without_query() {
        let uri = ResourceUri::Transcripts(TranscriptQuery::default());
        assert_eq!(uri.to_string(), "protokoll://transcripts");
    }

    #[test]
    fn query_values_are_escaped() {
        let uri = ResourceUri::Transcripts(TranscriptQuery::new("/my notes/a&b"));
        assert_eq!(
            uri.to_string(),
            "protokoll://transcripts?directory=/my%20notes/a%26b"
        );
        assert_eq!(uri.to_string().parse::<ResourceUri>().unwrap(), uri);
    }

    #[test]
    fn non_ascii_segments_round_trip() {
        let uri = ResourceUri::Entity {
            entity_type: "person".into(),
            id: "Zoë Müller".into(),
        };
        assert_eq!(uri.to_string(), "protokoll://entity/person/Zo%C3%AB%20M%C3%BCller");
        assert_eq!(uri.to_string().parse::<ResourceUri>().unwrap(), uri);
    }

    #[test]
    fn invalid_utf8_escape_is_rejected() {
        assert!("protokoll://transcript/%FF".parse::<ResourceUri>().is_err());
    }

    #[test]
    fn fixed_shapes() {
        assert_eq!(
            ResourceUri::Transcript { path: "2024/01/15-standup.md".into() }.to_string(),
            "protokoll://transcript/2024/01/15-standup.md"
        );
        assert_eq!(
            ResourceUri::Entities { entity_type: "person".into() }.to_string(),
            "protokoll://entities/person"
        );
        assert_eq!(
            ResourceUri::Entity { entity_type: "project".into(), id: "alpha".into() }.to_string(),
            "protokoll://entity/project/alpha"
        );
        assert_eq!(ResourceUri::Config.to_string(), "protokoll://config");
    }

    #[test]
    fn parses_every_shape() {
        let cases = [
            "protokoll://transcripts?directory=/output&limit=10&offset=20",
            "protokoll://transcript/2024/01/15-standup.md",
            "protokoll://entities/term",
            "protokoll://entity/company/acme",
            "protokoll://config",
        ];
        for case in cases {
            let parsed: ResourceUri = case.parse().unwrap();
            assert_eq!(parsed.to_string(), case);
        }
    }

    #[test]
    fn rejects_foreign_uris() {
        assert!("file:///tmp/x".parse::<ResourceUri>().is_err());
        assert!("protokoll://entity/only-type".parse::<ResourceUri>().is_err());
        assert!("protokoll://transcripts?limit=abc".parse::<ResourceUri>().is_err());
        assert!("protokoll://unknown/x".parse::<ResourceUri>().is_err());
    }
}
