//! Reversible identifier codec.
//!
//! Human-readable names (account ids, workspace names, project names) are
//! turned into filesystem-safe path segments, and composite identifiers are
//! derived from them. Every encoding is exactly invertible: for all valid
//! names, `decode(encode(x)) == x`. Malformed or foreign identifiers decode
//! to [`Error::MalformedIdentifier`].
//!
//! A workspace id is `escape(account_id) + "-" + escape(workspace_name)`.
//! The separator `-` is itself escaped inside both components, so splitting
//! on the first `-` is unambiguous and the composition is collision-free
//! for any two distinct names under the same account.

use crate::entities::{ACCOUNT_DOCUMENT, NESTED_WORKSPACE_DOCUMENT};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Separator between the account and name components of a workspace id.
const SEPARATOR: char = '-';

/// Stored prefix marking a content location relative to the store root.
///
/// Project documents never record an absolute path for their content
/// folder; they record this token plus a relative path, so the whole
/// store can be relocated without rewriting documents.
pub const STORE_ROOT_TOKEN: &str = "serverworkspace";

/// Identifier of a workspace, derived from `(account id, workspace name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(String);

impl WorkspaceId {
    /// View the identifier as a path-safe string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<WorkspaceId> for String {
    fn from(id: WorkspaceId) -> String {
        id.0
    }
}

/// Identifier of a project, derived from its name. Unique within one
/// workspace only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    /// View the identifier as a path-safe string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ProjectId> for String {
    fn from(id: ProjectId) -> String {
        id.0
    }
}

/// Characters stored verbatim by [`escape`]. Everything else, including
/// the composition separator, becomes a `%XX` escape.
fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ' ')
}

/// Escape a name into a single filesystem-safe path segment.
fn escape(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if is_safe(c) {
            out.push(c);
        } else {
            let mut buf = [0u8; 4];
            for b in c.encode_utf8(&mut buf).as_bytes() {
                out.push('%');
                out.push_str(&format!("{:02X}", b));
            }
        }
    }
    // "." and ".." are directory entries, never legal segment values.
    if out == "." {
        out = "%2E".to_string();
    } else if out == ".." {
        out = "%2E.".to_string();
    }
    out
}

/// Invert [`escape`]. Strict: a dangling or non-hex escape is malformed.
fn unescape(segment: &str) -> Result<String> {
    let mut bytes = Vec::with_capacity(segment.len());
    let mut chars = segment.chars();
    while let Some(c) = chars.next() {
        if c == '%' {
            let hi = chars.next();
            let lo = chars.next();
            match (hi, lo) {
                (Some(h), Some(l)) if h.is_ascii_hexdigit() && l.is_ascii_hexdigit() => {
                    let byte = (h.to_digit(16).unwrap() * 16 + l.to_digit(16).unwrap()) as u8;
                    bytes.push(byte);
                }
                _ => {
                    return Err(Error::MalformedIdentifier(format!(
                        "bad escape in segment: {segment}"
                    )))
                }
            }
        } else {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
    }
    String::from_utf8(bytes)
        .map_err(|_| Error::MalformedIdentifier(format!("segment is not UTF-8: {segment}")))
}

/// Derive the workspace id for `workspace_name` under `account_id`.
pub fn encode_workspace_id(account_id: &str, workspace_name: &str) -> WorkspaceId {
    WorkspaceId(format!(
        "{}{}{}",
        escape(account_id),
        SEPARATOR,
        escape(workspace_name)
    ))
}

/// Invert [`encode_workspace_id`], returning `(account_id, workspace_name)`.
pub fn decode_workspace_id(id: &WorkspaceId) -> Result<(String, String)> {
    let (account, name) = id
        .0
        .split_once(SEPARATOR)
        .ok_or_else(|| Error::MalformedIdentifier(format!("no separator in {}", id.0)))?;
    Ok((unescape(account)?, unescape(name)?))
}

/// Extract only the owning account id from a workspace id.
pub fn decode_workspace_account(id: &WorkspaceId) -> Result<String> {
    decode_workspace_id(id).map(|(account, _)| account)
}

/// Extract only the workspace display name from a workspace id.
pub fn decode_workspace_name(id: &WorkspaceId) -> Result<String> {
    decode_workspace_id(id).map(|(_, name)| name)
}

/// Check whether `name` is a document name with fixed meaning inside an
/// account folder: the account document itself, or the nested workspace
/// document of legacy layouts. The project-id encoder never produces one.
pub fn is_reserved_document_name(name: &str) -> bool {
    name == ACCOUNT_DOCUMENT || name == NESTED_WORKSPACE_DOCUMENT
}

/// Derive the project id from the project display name.
///
/// A name whose escaped form would collide with a fixed document name
/// gets its first byte force-escaped, so the project's document can never
/// land on the account document. Decoding is unaffected.
pub fn encode_project_id(project_name: &str) -> ProjectId {
    let mut encoded = escape(project_name);
    if is_reserved_document_name(&encoded) {
        let first = encoded.remove(0);
        encoded = format!("%{:02X}{encoded}", first as u8);
    }
    ProjectId(encoded)
}

/// Invert [`encode_project_id`].
pub fn decode_project_name(id: &ProjectId) -> Result<String> {
    unescape(&id.0)
}

/// Accept an already-encoded project id, validating it decodes cleanly.
/// Fixed document names are rejected; the encoder never emits them.
pub fn parse_project_id(raw: &str) -> Result<ProjectId> {
    unescape(raw)?;
    if is_reserved_document_name(raw) {
        return Err(Error::MalformedIdentifier(format!(
            "reserved document name: {raw}"
        )));
    }
    Ok(ProjectId(raw.to_string()))
}

/// Accept an already-encoded workspace id, validating it decodes cleanly.
pub fn parse_workspace_id(raw: &str) -> Result<WorkspaceId> {
    let id = WorkspaceId(raw.to_string());
    decode_workspace_id(&id)?;
    Ok(id)
}

/// Folder name for an account's root, derived from its id.
pub fn account_folder_name(account_id: &str) -> String {
    escape(account_id)
}

/// Folder name for a workspace's content, derived from its display name.
pub fn workspace_folder_name(workspace_name: &str) -> String {
    escape(workspace_name)
}

/// Encode a project content location for storage in a project document.
///
/// Locations under the store root are stored as a relocatable
/// `serverworkspace/<relative path>` token; anything else is stored
/// verbatim.
pub fn encode_content_location(store_root: &Path, location: &Path) -> String {
    match location.strip_prefix(store_root) {
        Ok(rel) => {
            let mut stored = String::from(STORE_ROOT_TOKEN);
            for part in rel.components() {
                stored.push('/');
                stored.push_str(&part.as_os_str().to_string_lossy());
            }
            stored
        }
        Err(_) => location.to_string_lossy().into_owned(),
    }
}

/// Invert [`encode_content_location`] against the current store root.
pub fn decode_content_location(store_root: &Path, stored: &str) -> PathBuf {
    if stored == STORE_ROOT_TOKEN {
        return store_root.to_path_buf();
    }
    match stored.strip_prefix(&format!("{STORE_ROOT_TOKEN}/")) {
        Some(rel) => store_root.join(rel),
        None => PathBuf::from(stored),
    }
}
