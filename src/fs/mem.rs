//! In-memory backend
//!
//! A volume of normalized absolute paths behind a `parking_lot::RwLock`.
//! Mirrors the disk backend's error contract (NotFound / AlreadyExists,
//! parent directories required) so store tests run unchanged against it.

use std::collections::HashMap;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{absolutize, FileMeta, Fs, FsFile};

const DEFAULT_FILE_MODE: u32 = 0o644;

#[derive(Debug, Clone)]
enum Node {
    File(FileNode),
    Dir,
}

#[derive(Debug, Clone)]
struct FileNode {
    data: Vec<u8>,
    mode: u32,
    uid: u32,
    gid: u32,
}

impl FileNode {
    fn empty() -> Self {
        Self {
            data: Vec::new(),
            mode: DEFAULT_FILE_MODE,
            uid: 0,
            gid: 0,
        }
    }
}

type Volume = Arc<RwLock<HashMap<PathBuf, Node>>>;

/// In-memory filesystem volume
///
/// Clones share the same volume.
#[derive(Debug, Clone)]
pub struct MemFs {
    volume: Volume,
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFs {
    /// Create an empty volume with just the root directory.
    pub fn new() -> Self {
        let fs = Self {
            volume: Arc::new(RwLock::new(HashMap::new())),
        };
        fs.volume
            .write()
            .insert(PathBuf::from("/"), Node::Dir);
        fs
    }

    /// Create all ancestors of `path` (convenience for test setup).
    pub fn mkdir_all(&self, path: &Path) -> io::Result<()> {
        let target = absolutize(path);
        let mut volume = self.volume.write();
        let mut current = PathBuf::new();
        for component in target.components() {
            current.push(component.as_os_str());
            match volume.get(&current) {
                Some(Node::Dir) => {}
                Some(Node::File(_)) => return Err(not_a_directory(&current)),
                None => {
                    volume.insert(current.clone(), Node::Dir);
                }
            }
        }
        Ok(())
    }

    /// All stored paths, sorted (for testing/debugging).
    pub fn paths(&self) -> Vec<PathBuf> {
        let volume = self.volume.read();
        let mut paths: Vec<PathBuf> = volume.keys().cloned().collect();
        paths.sort();
        paths
    }

    fn parent_dir_exists(
        volume: &HashMap<PathBuf, Node>,
        path: &Path,
    ) -> io::Result<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => return Ok(()),
        };
        match volume.get(parent) {
            Some(Node::Dir) => Ok(()),
            Some(Node::File(_)) => Err(not_a_directory(parent)),
            None => Err(not_found(parent)),
        }
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file or directory: {}", path.display()),
    )
}

fn already_exists(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("already exists: {}", path.display()),
    )
}

fn not_a_directory(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::Other,
        format!("not a directory: {}", path.display()),
    )
}

fn is_a_directory(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::Other,
        format!("is a directory: {}", path.display()),
    )
}

/// Write handle into the volume; contents become visible on
/// flush/sync/close (drop), like a buffered descriptor.
struct MemFile {
    volume: Volume,
    path: PathBuf,
    buf: Vec<u8>,
}

impl MemFile {
    fn commit(&mut self) {
        let mut volume = self.volume.write();
        match volume.get_mut(&self.path) {
            Some(Node::File(node)) => node.data = self.buf.clone(),
            // Unlinked while open; nothing to commit to.
            _ => {}
        }
    }
}

impl io::Write for MemFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.commit();
        Ok(())
    }
}

impl FsFile for MemFile {
    fn sync_all(&mut self) -> io::Result<()> {
        self.commit();
        Ok(())
    }
}

impl Drop for MemFile {
    fn drop(&mut self) {
        self.commit();
    }
}

impl Fs for MemFs {
    fn stat(&self, path: &Path) -> io::Result<FileMeta> {
        let key = absolutize(path);
        let volume = self.volume.read();
        match volume.get(&key) {
            Some(Node::File(node)) => Ok(FileMeta {
                len: node.data.len() as u64,
                mode: node.mode,
                uid: node.uid,
                gid: node.gid,
                is_dir: false,
            }),
            Some(Node::Dir) => Ok(FileMeta {
                len: 0,
                mode: 0o755,
                uid: 0,
                gid: 0,
                is_dir: true,
            }),
            None => Err(not_found(&key)),
        }
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        let key = absolutize(path);
        let volume = self.volume.read();
        match volume.get(&key) {
            Some(Node::File(node)) => Ok(Box::new(Cursor::new(node.data.clone()))),
            Some(Node::Dir) => Err(is_a_directory(&key)),
            None => Err(not_found(&key)),
        }
    }

    fn open_write(&self, path: &Path) -> io::Result<Box<dyn FsFile>> {
        let key = absolutize(path);
        {
            let mut volume = self.volume.write();
            Self::parent_dir_exists(&volume, &key)?;
            match volume.get_mut(&key) {
                Some(Node::Dir) => return Err(is_a_directory(&key)),
                // Truncate, keeping ownership/permissions.
                Some(Node::File(node)) => node.data.clear(),
                None => {
                    volume.insert(key.clone(), Node::File(FileNode::empty()));
                }
            }
        }
        Ok(Box::new(MemFile {
            volume: Arc::clone(&self.volume),
            path: key,
            buf: Vec::new(),
        }))
    }

    fn create_new(&self, path: &Path) -> io::Result<()> {
        let key = absolutize(path);
        let mut volume = self.volume.write();
        Self::parent_dir_exists(&volume, &key)?;
        if volume.contains_key(&key) {
            return Err(already_exists(&key));
        }
        volume.insert(key, Node::File(FileNode::empty()));
        Ok(())
    }

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        let key = absolutize(path);
        let volume = self.volume.read();
        match volume.get(&key) {
            Some(Node::File(node)) => Ok(node.data.clone()),
            Some(Node::Dir) => Err(is_a_directory(&key)),
            None => Err(not_found(&key)),
        }
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let key = absolutize(path);
        let mut volume = self.volume.write();
        Self::parent_dir_exists(&volume, &key)?;
        match volume.get_mut(&key) {
            Some(Node::Dir) => Err(is_a_directory(&key)),
            Some(Node::File(node)) => {
                node.data = data.to_vec();
                Ok(())
            }
            None => {
                let mut node = FileNode::empty();
                node.data = data.to_vec();
                volume.insert(key, Node::File(node));
                Ok(())
            }
        }
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let from_key = absolutize(from);
        let to_key = absolutize(to);
        let mut volume = self.volume.write();
        Self::parent_dir_exists(&volume, &to_key)?;
        let node = match volume.get(&from_key) {
            Some(node) => node.clone(),
            None => return Err(not_found(&from_key)),
        };
        if matches!(volume.get(&to_key), Some(Node::Dir)) {
            return Err(is_a_directory(&to_key));
        }
        volume.remove(&from_key);
        volume.insert(to_key, node);
        Ok(())
    }

    fn unlink(&self, path: &Path) -> io::Result<()> {
        let key = absolutize(path);
        let mut volume = self.volume.write();
        match volume.get(&key) {
            Some(Node::File(_)) => {
                volume.remove(&key);
                Ok(())
            }
            Some(Node::Dir) => Err(is_a_directory(&key)),
            None => Err(not_found(&key)),
        }
    }

    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        let key = absolutize(path);
        let mut volume = self.volume.write();
        match volume.get_mut(&key) {
            Some(Node::File(node)) => {
                node.mode = mode;
                Ok(())
            }
            Some(Node::Dir) => Ok(()),
            None => Err(not_found(&key)),
        }
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()> {
        let key = absolutize(path);
        let mut volume = self.volume.write();
        match volume.get_mut(&key) {
            Some(Node::File(node)) => {
                node.uid = uid;
                node.gid = gid;
                Ok(())
            }
            Some(Node::Dir) => Ok(()),
            None => Err(not_found(&key)),
        }
    }

    fn realpath(&self, path: &Path) -> io::Result<PathBuf> {
        let key = absolutize(path);
        let volume = self.volume.read();
        if volume.contains_key(&key) {
            Ok(key)
        } else {
            Err(not_found(&key))
        }
    }

    fn mkdir(&self, path: &Path) -> io::Result<()> {
        let key = absolutize(path);
        let mut volume = self.volume.write();
        if volume.contains_key(&key) {
            return Err(already_exists(&key));
        }
        Self::parent_dir_exists(&volume, &key)?;
        volume.insert(key, Node::Dir);
        Ok(())
    }
}
