//! Concurrent radix tree over path templates.
//!
//! # Responsibilities
//! - Store values keyed by `/seg1/seg2/...` templates
//! - Support static, `:param`, and terminal `*wildcard` segments
//! - Capture parameter values during lookup
//! - Compact the structure when routes are removed
//!
//! # Design Decisions
//! - Match priority at every depth: static > parameter > wildcard
//! - No backtracking across priorities; first match at each depth wins
//! - A wildcard tolerates no siblings, and must be the terminal segment
//! - Structure guarded by one `RwLock`; each terminal value sits behind its
//!   own `Mutex` so in-place updates can race unrelated structural edits

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use thiserror::Error;

/// Rejections surfaced by [`RouteTree::insert`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("path must start with '/'")]
    BadPath,

    #[error("param and wildcard names cannot be empty")]
    BadSegment,

    #[error("conflict: different param names at same level")]
    ConflictParam,

    #[error("conflict: wildcard cannot coexist with other children")]
    ConflictWildcard,
}

struct ParamChild<T> {
    name: String,
    node: Box<Node<T>>,
}

struct WildChild<T> {
    name: String,
    node: Box<Node<T>>,
}

struct Node<T> {
    children: HashMap<String, Node<T>>,
    param: Option<ParamChild<T>>,
    wild: Option<WildChild<T>>,
    value: Mutex<Option<T>>,
}

impl<T> Node<T> {
    fn new() -> Self {
        Self {
            children: HashMap::new(),
            param: None,
            wild: None,
            value: Mutex::new(None),
        }
    }

    fn take_value(&self) -> Option<T> {
        self.value.lock().unwrap().take()
    }

    fn is_prunable(&self) -> bool {
        self.children.is_empty()
            && self.param.is_none()
            && self.wild.is_none()
            && self.value.lock().unwrap().is_none()
    }
}

/// Radix tree supporting concurrent lookups while registrations mutate.
pub struct RouteTree<T> {
    root: RwLock<Node<T>>,
}

impl<T: Clone> RouteTree<T> {
    pub fn new() -> Self {
        Self {
            root: RwLock::new(Node::new()),
        }
    }

    /// Insert a value under a path template. Re-inserting the same template
    /// overwrites the previous value.
    pub fn insert(&self, path: &str, value: T) -> Result<(), TreeError> {
        if path.is_empty() || !path.starts_with('/') {
            return Err(TreeError::BadPath);
        }
        let segments = split_segments(path);

        let mut root = self.root.write().unwrap();
        let mut cur: &mut Node<T> = &mut root;

        for (i, seg) in segments.iter().enumerate() {
            if let Some(name) = seg.strip_prefix(':') {
                if name.is_empty() {
                    return Err(TreeError::BadSegment);
                }
                if cur.wild.is_some() {
                    return Err(TreeError::ConflictWildcard);
                }
                if cur.param.is_none() {
                    cur.param = Some(ParamChild {
                        name: name.to_string(),
                        node: Box::new(Node::new()),
                    });
                }
                let param = cur.param.as_mut().unwrap();
                if param.name != name {
                    return Err(TreeError::ConflictParam);
                }
                cur = &mut param.node;
            } else if let Some(name) = seg.strip_prefix('*') {
                if name.is_empty() {
                    return Err(TreeError::BadSegment);
                }
                if i != segments.len() - 1
                    || !cur.children.is_empty()
                    || cur.param.is_some()
                {
                    return Err(TreeError::ConflictWildcard);
                }
                if cur.wild.is_none() {
                    cur.wild = Some(WildChild {
                        name: name.to_string(),
                        node: Box::new(Node::new()),
                    });
                }
                cur = &mut cur.wild.as_mut().unwrap().node;
            } else {
                if cur.wild.is_some() {
                    return Err(TreeError::ConflictWildcard);
                }
                cur = cur
                    .children
                    .entry(seg.to_string())
                    .or_insert_with(Node::new);
            }
        }

        *cur.value.lock().unwrap() = Some(value);
        Ok(())
    }

    /// Look up a concrete path. Returns the stored value and the captured
    /// parameters on a hit.
    pub fn lookup(&self, path: &str) -> Option<(T, HashMap<String, String>)> {
        if path.is_empty() || !path.starts_with('/') {
            return None;
        }
        let segments = split_segments(path);
        let mut params = HashMap::new();

        let root = self.root.read().unwrap();
        let mut cur: &Node<T> = &root;

        let mut i = 0;
        while i < segments.len() {
            let seg = segments[i];
            if let Some(child) = cur.children.get(seg) {
                cur = child;
                i += 1;
                continue;
            }
            if let Some(param) = &cur.param {
                params.insert(param.name.clone(), seg.to_string());
                cur = &param.node;
                i += 1;
                continue;
            }
            if let Some(wild) = &cur.wild {
                params.insert(wild.name.clone(), segments[i..].join("/"));
                cur = &wild.node;
                break;
            }
            return None;
        }

        if let Some(value) = cur.value.lock().unwrap().clone() {
            return Some((value, params));
        }

        // Exhausted segments on an interior node: a wildcard child still
        // matches the empty remainder ("/" against "/*rest" captures "").
        let wild = cur.wild.as_ref()?;
        let value = wild.node.value.lock().unwrap().clone()?;
        params.insert(wild.name.clone(), String::new());
        Some((value, params))
    }

    /// Replace the terminal value in place if the template is present.
    /// Runs under the shared structural lock, so it can proceed concurrently
    /// with lookups and with updates of unrelated templates.
    pub fn update<F: FnOnce(&mut T)>(&self, path: &str, f: F) -> bool {
        if path.is_empty() || !path.starts_with('/') {
            return false;
        }
        let segments = split_segments(path);

        let root = self.root.read().unwrap();
        let mut cur: &Node<T> = &root;

        for seg in &segments {
            if let Some(child) = cur.children.get(*seg) {
                cur = child;
                continue;
            }
            if let Some(param) = &cur.param {
                cur = &param.node;
                continue;
            }
            if let Some(wild) = &cur.wild {
                cur = &wild.node;
                break;
            }
            return false;
        }

        let mut slot = cur.value.lock().unwrap();
        match slot.as_mut() {
            Some(value) => {
                f(value);
                true
            }
            None => false,
        }
    }

    /// Remove a template. Ancestors left valueless and childless are pruned.
    pub fn remove(&self, path: &str) -> bool {
        if path.is_empty() || !path.starts_with('/') {
            return false;
        }
        let segments = split_segments(path);

        let mut root = self.root.write().unwrap();
        remove_at(&mut root, &segments)
    }

    /// True when no template is stored anywhere in the tree.
    pub fn is_empty(&self) -> bool {
        let root = self.root.read().unwrap();
        root.is_prunable()
    }
}

impl<T: Clone> Default for RouteTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn remove_at<T>(node: &mut Node<T>, segments: &[&str]) -> bool {
    let Some((seg, rest)) = segments.split_first() else {
        return node.take_value().is_some();
    };

    if node.children.contains_key(*seg) {
        let child = node.children.get_mut(*seg).unwrap();
        let removed = remove_at(child, rest);
        if removed && child.is_prunable() {
            node.children.remove(*seg);
        }
        return removed;
    }
    if let Some(param) = node.param.as_mut() {
        let removed = remove_at(&mut param.node, rest);
        if removed && param.node.is_prunable() {
            node.param = None;
        }
        return removed;
    }
    if let Some(wild) = node.wild.as_mut() {
        // The wildcard consumes the remainder of the path.
        let removed = wild.node.take_value().is_some();
        if removed && wild.node.is_prunable() {
            node.wild = None;
        }
        return removed;
    }
    false
}

/// Split a path into match segments: query and fragment are dropped,
/// repeated slashes collapse, the leading slash is implied.
fn split_segments(path: &str) -> Vec<&str> {
    let mut p = path.trim();
    if let Some(i) = p.find('?') {
        p = &p[..i];
    }
    if let Some(i) = p.find('#') {
        p = &p[..i];
    }
    p.split('/').filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup_static() {
        let tree = RouteTree::new();
        tree.insert("/a/b/c", 1).unwrap();

        let (value, params) = tree.lookup("/a/b/c").unwrap();
        assert_eq!(value, 1);
        assert!(params.is_empty());
        assert!(tree.lookup("/a/b").is_none());
        assert!(tree.lookup("/a/b/c/d").is_none());
    }

    #[test]
    fn insert_rejects_bad_paths() {
        let tree = RouteTree::new();
        assert_eq!(tree.insert("", 1), Err(TreeError::BadPath));
        assert_eq!(tree.insert("a/b", 1), Err(TreeError::BadPath));
        assert_eq!(tree.insert("/a/:", 1), Err(TreeError::BadSegment));
        assert_eq!(tree.insert("/a/*", 1), Err(TreeError::BadSegment));
    }

    #[test]
    fn param_captures_one_segment() {
        let tree = RouteTree::new();
        tree.insert("/users/:id", 7).unwrap();

        let (value, params) = tree.lookup("/users/123").unwrap();
        assert_eq!(value, 7);
        assert_eq!(params["id"], "123");
        assert!(tree.lookup("/users/123/extra").is_none());
        assert!(tree.lookup("/users").is_none());
    }

    #[test]
    fn param_name_conflict_rejected() {
        let tree = RouteTree::new();
        tree.insert("/users/:id", 1).unwrap();
        assert_eq!(
            tree.insert("/users/:name", 2),
            Err(TreeError::ConflictParam)
        );
        // same name at the same level is fine
        tree.insert("/users/:id/posts", 3).unwrap();
    }

    #[test]
    fn wildcard_captures_remainder() {
        let tree = RouteTree::new();
        tree.insert("/*rest", 9).unwrap();

        let (_, params) = tree.lookup("/").unwrap();
        assert_eq!(params["rest"], "");
        let (_, params) = tree.lookup("/a").unwrap();
        assert_eq!(params["rest"], "a");
        let (_, params) = tree.lookup("/a/b/c").unwrap();
        assert_eq!(params["rest"], "a/b/c");
    }

    #[test]
    fn wildcard_must_be_terminal_and_alone() {
        let tree = RouteTree::new();
        assert_eq!(
            tree.insert("/files/*path/tail", 1),
            Err(TreeError::ConflictWildcard)
        );

        tree.insert("/files/static", 1).unwrap();
        assert_eq!(
            tree.insert("/files/*path", 2),
            Err(TreeError::ConflictWildcard)
        );

        let tree = RouteTree::new();
        tree.insert("/files/*path", 1).unwrap();
        assert_eq!(
            tree.insert("/files/:name", 2),
            Err(TreeError::ConflictWildcard)
        );
        assert_eq!(
            tree.insert("/files/static", 3),
            Err(TreeError::ConflictWildcard)
        );
    }

    #[test]
    fn static_beats_param_beats_wildcard() {
        let tree = RouteTree::new();
        tree.insert("/v/ping", 1).unwrap();
        tree.insert("/v/:id", 2).unwrap();

        assert_eq!(tree.lookup("/v/ping").unwrap().0, 1);
        assert_eq!(tree.lookup("/v/other").unwrap().0, 2);

        let tree = RouteTree::new();
        tree.insert("/w/:id", 2).unwrap();
        let (value, params) = tree.lookup("/w/anything").unwrap();
        assert_eq!(value, 2);
        assert_eq!(params["id"], "anything");
    }

    #[test]
    fn reinsert_overwrites() {
        let tree = RouteTree::new();
        tree.insert("/dup", 1).unwrap();
        tree.insert("/dup", 2).unwrap();
        assert_eq!(tree.lookup("/dup").unwrap().0, 2);
    }

    #[test]
    fn remove_prunes_empty_branches() {
        let tree = RouteTree::new();
        tree.insert("/a/b/c", 1).unwrap();
        tree.insert("/a/x", 2).unwrap();

        assert!(tree.remove("/a/b/c"));
        assert!(tree.lookup("/a/b/c").is_none());
        // sibling branch untouched
        assert_eq!(tree.lookup("/a/x").unwrap().0, 2);

        assert!(tree.remove("/a/x"));
        assert!(tree.is_empty());
        assert!(!tree.remove("/a/x"));
    }

    #[test]
    fn remove_param_and_wildcard_nodes() {
        let tree = RouteTree::new();
        tree.insert("/u/:id", 1).unwrap();
        tree.insert("/f/*rest", 2).unwrap();

        assert!(tree.remove("/u/:id"));
        assert!(tree.remove("/f/*rest"));
        assert!(tree.is_empty());
    }

    #[test]
    fn interior_value_survives_leaf_removal() {
        let tree = RouteTree::new();
        tree.insert("/a", 1).unwrap();
        tree.insert("/a/b", 2).unwrap();

        assert!(tree.remove("/a/b"));
        assert_eq!(tree.lookup("/a").unwrap().0, 1);
        assert!(!tree.is_empty());
    }

    #[test]
    fn update_replaces_value_in_place() {
        let tree = RouteTree::new();
        tree.insert("/counter", 1).unwrap();

        assert!(tree.update("/counter", |v| *v += 10));
        assert_eq!(tree.lookup("/counter").unwrap().0, 11);
        assert!(!tree.update("/missing", |v| *v += 1));
    }

    #[test]
    fn repeated_slashes_collapse() {
        let tree = RouteTree::new();
        tree.insert("/a//b", 1).unwrap();
        assert_eq!(tree.lookup("/a/b").unwrap().0, 1);
        assert_eq!(tree.lookup("//a///b").unwrap().0, 1);
    }
}
