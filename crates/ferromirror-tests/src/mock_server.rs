//! In-memory remote server with failure injection
//!
//! The server keeps a tree of files and directories addressed by
//! remote-relative paths, counts every call by operation and can be told to
//! fail selected operations, once, a few times or always.

use ferromirror_types::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Operations the mock client forwards to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    /// Session establishment
    Connect,
    /// Liveness probe
    Pwd,
    /// Directory listing
    List,
    /// File upload
    Upload,
    /// File download
    Download,
    /// File delete
    Delete,
    /// Empty directory delete
    DeleteEmptyDirectory,
    /// Recursive directory delete
    DeleteDirectory,
    /// Server-side rename
    Rename,
    /// Directory creation
    Mkdir,
}

/// Stored entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// File with contents
    File(Vec<u8>),
    /// Directory
    Dir,
}

#[derive(Debug, Clone)]
struct FailureRule {
    op: MockOp,
    path: Option<String>,
    error: Error,
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct ServerState {
    tree: BTreeMap<String, Node>,
    rules: Vec<FailureRule>,
    calls: HashMap<MockOp, usize>,
    journal: Vec<(MockOp, String)>,
    in_flight: usize,
    max_in_flight: usize,
    latency: HashMap<MockOp, Duration>,
    disconnects: usize,
}

/// Shared handle on the in-memory server
#[derive(Debug, Clone, Default)]
pub struct MockServer {
    state: Arc<Mutex<ServerState>>,
}

fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn parent_of(path: &str) -> &str {
    path.rfind('/').map_or("", |index| &path[..index])
}

fn is_below(path: &str, ancestor: &str) -> bool {
    ancestor.is_empty() || path == ancestor || path.starts_with(&format!("{ancestor}/"))
}

impl MockServer {
    /// Empty server
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a file, creating its parent directories
    pub fn with_file(self, path: &str, contents: &[u8]) -> Self {
        self.put_file(path, contents);
        self
    }

    /// Add a directory and its parents
    pub fn with_dir(self, path: &str) -> Self {
        self.put_dir(path);
        self
    }

    /// Add a file, creating its parent directories
    pub fn put_file(&self, path: &str, contents: &[u8]) {
        let path = normalize(path);
        let mut state = self.state();
        insert_dirs(&mut state.tree, parent_of(&path));
        state.tree.insert(path, Node::File(contents.to_vec()));
    }

    /// Add a directory and its parents
    pub fn put_dir(&self, path: &str) {
        insert_dirs(&mut self.state().tree, &normalize(path));
    }

    /// Fail the next `times` calls of `op`
    pub fn fail_times(&self, op: MockOp, times: usize, error: Error) {
        self.add_rule(op, None, error, Some(times));
    }

    /// Fail every call of `op`
    pub fn fail_always(&self, op: MockOp, error: Error) {
        self.add_rule(op, None, error, None);
    }

    /// Fail every call of `op` on `path`
    pub fn fail_path(&self, op: MockOp, path: &str, error: Error) {
        self.add_rule(op, Some(normalize(path)), error, None);
    }

    /// Remove all failure rules
    pub fn heal(&self) {
        self.state().rules.clear();
    }

    fn add_rule(&self, op: MockOp, path: Option<String>, error: Error, remaining: Option<usize>) {
        self.state().rules.push(FailureRule {
            op,
            path,
            error,
            remaining,
        });
    }

    /// Delay every call of `op`
    pub fn set_latency(&self, op: MockOp, latency: Duration) {
        self.state().latency.insert(op, latency);
    }

    /// Number of calls of `op`, failed ones included
    pub fn calls(&self, op: MockOp) -> usize {
        self.state().calls.get(&op).copied().unwrap_or_default()
    }

    /// Every call in order, with the path it addressed
    pub fn journal(&self) -> Vec<(MockOp, String)> {
        self.state().journal.clone()
    }

    /// Highest number of calls that were running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.state().max_in_flight
    }

    /// Number of calls running right now
    pub fn in_flight(&self) -> usize {
        self.state().in_flight
    }

    /// Clean disconnects seen
    pub fn disconnects(&self) -> usize {
        self.state().disconnects
    }

    /// Whether `path` exists
    pub fn exists(&self, path: &str) -> bool {
        self.state().tree.contains_key(&normalize(path))
    }

    /// Whether `path` is a directory
    pub fn is_dir(&self, path: &str) -> bool {
        matches!(self.state().tree.get(&normalize(path)), Some(Node::Dir))
    }

    /// Contents of the file at `path`
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        match self.state().tree.get(&normalize(path)) {
            Some(Node::File(contents)) => Some(contents.clone()),
            _ => None,
        }
    }

    /// Every stored path, sorted
    pub fn paths(&self) -> Vec<String> {
        self.state().tree.keys().cloned().collect()
    }

    pub(crate) fn record_disconnect(&self) {
        self.state().disconnects += 1;
    }

    /// Count the call, apply latency and injected failures
    pub(crate) async fn enter(&self, op: MockOp, path: &str) -> Result<CallGuard> {
        let path = normalize(path);
        let latency = {
            let mut state = self.state();
            *state.calls.entry(op).or_default() += 1;
            state.journal.push((op, path.clone()));
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            state.latency.get(&op).copied()
        };
        let guard = CallGuard {
            server: self.clone(),
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let failure = {
            let mut state = self.state();
            state
                .rules
                .iter_mut()
                .find(|rule| {
                    rule.op == op
                        && rule.remaining != Some(0)
                        && rule.path.as_ref().map_or(true, |p| *p == path)
                })
                .map(|rule| {
                    if let Some(remaining) = rule.remaining.as_mut() {
                        *remaining -= 1;
                    }
                    rule.error.clone()
                })
        };
        match failure {
            Some(error) => Err(error),
            None => Ok(guard),
        }
    }

    pub(crate) fn with_tree<T>(&self, f: impl FnOnce(&mut BTreeMap<String, Node>) -> T) -> T {
        f(&mut self.state().tree)
    }
}

/// Marks a call as finished when dropped
pub(crate) struct CallGuard {
    server: MockServer,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.server.state().in_flight -= 1;
    }
}

fn insert_dirs(tree: &mut BTreeMap<String, Node>, path: &str) {
    let mut current = String::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if !current.is_empty() {
            current.push('/');
        }
        current.push_str(segment);
        tree.entry(current.clone()).or_insert(Node::Dir);
    }
}

/// Tree operations used by the mock client
pub(crate) mod tree {
    use super::{insert_dirs, is_below, normalize, parent_of, Node};
    use ferromirror_types::{Error, FileInfo, Result};
    use std::collections::BTreeMap;

    fn not_found(path: &str) -> Error {
        Error::protocol(Some(550), format!("{path}: No such file or directory"))
    }

    fn parent_exists(tree: &BTreeMap<String, Node>, path: &str) -> bool {
        let parent = parent_of(path);
        parent.is_empty() || matches!(tree.get(parent), Some(Node::Dir))
    }

    pub fn list(tree: &BTreeMap<String, Node>, path: &str) -> Result<Vec<FileInfo>> {
        let path = normalize(path);
        if !path.is_empty() && !matches!(tree.get(&path), Some(Node::Dir)) {
            return Err(not_found(&path));
        }
        Ok(tree
            .iter()
            .filter(|(key, _)| !key.is_empty() && parent_of(key) == path)
            .map(|(key, node)| {
                let name = key.rsplit('/').next().unwrap_or(key).to_string();
                match node {
                    Node::File(contents) => FileInfo::file(name, contents.len() as u64),
                    Node::Dir => FileInfo::directory(name),
                }
            })
            .collect())
    }

    pub fn write(tree: &mut BTreeMap<String, Node>, path: &str, contents: Vec<u8>) -> Result<()> {
        let path = normalize(path);
        if !parent_exists(tree, &path) {
            return Err(not_found(parent_of(&path)));
        }
        if matches!(tree.get(&path), Some(Node::Dir)) {
            return Err(Error::protocol(Some(553), format!("{path}: Is a directory")));
        }
        tree.insert(path, Node::File(contents));
        Ok(())
    }

    pub fn read(tree: &BTreeMap<String, Node>, path: &str) -> Result<Vec<u8>> {
        let path = normalize(path);
        match tree.get(&path) {
            Some(Node::File(contents)) => Ok(contents.clone()),
            Some(Node::Dir) => Err(Error::protocol(Some(550), format!("{path}: Not a regular file"))),
            None => Err(not_found(&path)),
        }
    }

    pub fn delete_file(tree: &mut BTreeMap<String, Node>, path: &str) -> Result<()> {
        let path = normalize(path);
        match tree.get(&path) {
            Some(Node::File(_)) => {
                tree.remove(&path);
                Ok(())
            }
            Some(Node::Dir) => Err(Error::protocol(Some(550), format!("{path}: Is a directory"))),
            None => Err(not_found(&path)),
        }
    }

    pub fn delete_empty_dir(tree: &mut BTreeMap<String, Node>, path: &str) -> Result<()> {
        let path = normalize(path);
        if !matches!(tree.get(&path), Some(Node::Dir)) {
            return Err(not_found(&path));
        }
        if tree.keys().any(|key| key != &path && is_below(key, &path)) {
            return Err(Error::protocol(Some(550), format!("{path}: Directory not empty")));
        }
        tree.remove(&path);
        Ok(())
    }

    pub fn delete_tree(tree: &mut BTreeMap<String, Node>, path: &str) -> Result<()> {
        let path = normalize(path);
        if path.is_empty() {
            return Err(Error::protocol(Some(550), "refusing to delete the remote root"));
        }
        if !tree.contains_key(&path) {
            return Err(not_found(&path));
        }
        tree.retain(|key, _| !is_below(key, &path));
        Ok(())
    }

    pub fn rename(tree: &mut BTreeMap<String, Node>, from: &str, to: &str) -> Result<()> {
        let (from, to) = (normalize(from), normalize(to));
        if !tree.contains_key(&from) {
            return Err(not_found(&from));
        }
        if tree.contains_key(&to) || !parent_exists(tree, &to) {
            return Err(Error::protocol(Some(553), format!("{to}: cannot rename here")));
        }
        let moved: Vec<(String, Node)> = tree
            .iter()
            .filter(|(key, _)| is_below(key, &from))
            .map(|(key, node)| (format!("{to}{}", &key[from.len()..]), node.clone()))
            .collect();
        tree.retain(|key, _| !is_below(key, &from));
        tree.extend(moved);
        Ok(())
    }

    pub fn mkdir(tree: &mut BTreeMap<String, Node>, path: &str) -> Result<()> {
        let path = normalize(path);
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(segment);
            if matches!(tree.get(&current), Some(Node::File(_))) {
                return Err(Error::protocol(Some(550), format!("{current}: File exists")));
            }
        }
        insert_dirs(tree, &path);
        Ok(())
    }

    pub fn is_dir(tree: &BTreeMap<String, Node>, path: &str) -> bool {
        let path = normalize(path);
        path.is_empty() || matches!(tree.get(&path), Some(Node::Dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failure_rules_count_down() {
        let server = MockServer::new();
        server.fail_times(MockOp::Upload, 2, Error::network("read ECONNRESET"));

        assert!(server.enter(MockOp::Upload, "a").await.is_err());
        assert!(server.enter(MockOp::Upload, "a").await.is_err());
        assert!(server.enter(MockOp::Upload, "a").await.is_ok());
        assert_eq!(server.calls(MockOp::Upload), 3);
        assert_eq!(server.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_path_rules() {
        let server = MockServer::new();
        server.fail_path(MockOp::List, "/private", Error::protocol(Some(550), "denied"));
        assert!(server.enter(MockOp::List, "private").await.is_err());
        assert!(server.enter(MockOp::List, "public").await.is_ok());
    }

    #[test]
    fn test_rename_moves_subtree() {
        let server = MockServer::new()
            .with_file("a/b/c.txt", b"c")
            .with_dir("d");
        server
            .with_tree(|t| tree::rename(t, "a", "d/a"))
            .unwrap();
        assert_eq!(server.paths(), vec!["d", "d/a", "d/a/b", "d/a/b/c.txt"]);
    }

    #[test]
    fn test_listing_direct_children() {
        let server = MockServer::new()
            .with_file("a/b.txt", b"bb")
            .with_file("c.txt", b"c");
        let root = server.with_tree(|t| tree::list(t, "")).unwrap();
        let names: Vec<_> = root.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c.txt"]);
        assert!(root[0].is_dir());
        let nested = server.with_tree(|t| tree::list(t, "a")).unwrap();
        assert_eq!(nested[0].size, 2);
    }
}
