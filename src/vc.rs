//! Версионирование каталога через Git.

use super::errors::Result;
use std::{
    fs,
    path::{Path, PathBuf},
};
use git2::{
    DiffFormat, DiffOptions, IndexAddOption, Repository, Signature, Status, StatusOptions,
};
use tracing::{debug, info, warn};


pub const VCS_IGNORE: &[&str] = &["*~", "*.swp", "*.json_dump.tmp"];


pub trait VersionControl {
    fn commit_all(&self, message: &str) -> Result<()>;

    /// Человекочитаемое описание изменений: конечная последовательность строк,
    /// повторно не обходится. Содержимое изменений вычисляется по мере обхода
    fn status(&self) -> Result<Box<dyn Iterator<Item = String> + '_>>;
}


pub struct GitVersionControl {
    repo: Repository,
    repo_dir: PathBuf,
}

impl GitVersionControl {
    pub fn open(repo_dir: impl AsRef<Path>) -> Result<Self> {
        let repo_dir = repo_dir.as_ref().to_path_buf();
        let repo = Repository::open(&repo_dir)?;
        Ok(Self { repo, repo_dir })
    }

    /// Создаёт каталог и репозиторий, коммитит `.gitignore`
    pub fn init(repo_dir: impl AsRef<Path>) -> Result<Self> {
        let repo_dir = repo_dir.as_ref().to_path_buf();
        fs::create_dir_all(&repo_dir)?;

        info!("Initializing Git repository at {}", repo_dir.display());
        let repo = Repository::init(&repo_dir)?;
        fs::write(repo_dir.join(".gitignore"), VCS_IGNORE.join("\n") + "\n")?;

        let vc = Self { repo, repo_dir };
        {
            let mut index = vc.repo.index()?;
            index.add_path(Path::new(".gitignore"))?;
            index.write()?;
        }
        vc.commit_index("initial commit")?;
        Ok(vc)
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    fn signature(&self) -> Result<Signature<'static>> {
        match self.repo.signature() {
            Ok(sig) => Ok(sig),
            Err(_) => Ok(Signature::now("thread_runner", "thread_runner@localhost")?),
        }
    }

    fn commit_index(&self, message: &str) -> Result<()> {
        let mut index = self.repo.index()?;
        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let sig = self.signature()?;
        let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());

        if let Some(parent) = &parent {
            self.repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[parent])?;
        } else {
            self.repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[])?;
        }

        debug!("Committed: {}", message);
        Ok(())
    }

    /// Патч одного файла: HEAD против рабочего каталога с учётом индекса
    fn file_diff(&self, path: &str) -> Result<String> {
        let head = self.repo.head().ok().and_then(|h| h.peel_to_tree().ok());
        let mut opts = DiffOptions::new();
        opts.pathspec(path).disable_pathspec_match(true);

        let diff = self
            .repo
            .diff_tree_to_workdir_with_index(head.as_ref(), Some(&mut opts))?;

        let mut out = String::new();
        diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            if let origin @ ('+' | '-' | ' ') = line.origin() {
                out.push(origin);
            }
            out.push_str(&String::from_utf8_lossy(line.content()));
            true
        })?;
        Ok(out)
    }
}


impl VersionControl for GitVersionControl {
    fn commit_all(&self, message: &str) -> Result<()> {
        let mut index = self.repo.index()?;
        index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"], None)?;
        index.write()?;
        self.commit_index(message)
    }

    fn status(&self) -> Result<Box<dyn Iterator<Item = String> + '_>> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);

        let statuses = self.repo.statuses(Some(&mut opts))?;
        let mut changed = Vec::new();
        let mut untracked = Vec::new();

        for entry in statuses.iter() {
            let Some(path) = entry.path() else { continue };
            let status = entry.status();

            if status.contains(Status::WT_NEW) {
                untracked.push(path.to_string());
            } else if status.intersects(
                Status::INDEX_NEW
                    | Status::INDEX_MODIFIED
                    | Status::INDEX_DELETED
                    | Status::INDEX_RENAMED
                    | Status::INDEX_TYPECHANGE
                    | Status::WT_MODIFIED
                    | Status::WT_DELETED
                    | Status::WT_RENAMED
                    | Status::WT_TYPECHANGE,
            ) {
                changed.push(path.to_string());
            }
        }

        let changes_header = (!changed.is_empty()).then(|| "Changes\n".to_string());
        let diffs = changed.into_iter().map(move |path| {
            self.file_diff(&path).unwrap_or_else(|err| {
                warn!(path = %path, "diff failed: {}", err);
                format!("  changed: {}\n", path)
            })
        });
        let untracked_header =
            (!untracked.is_empty()).then(|| "\n\nUntracked files:\n".to_string());
        let untracked = untracked.into_iter().map(|path| format!("  {}\n", path));

        Ok(Box::new(
            changes_header
                .into_iter()
                .chain(diffs)
                .chain(untracked_header)
                .chain(untracked),
        ))
    }
}


/// `None`, если каталог не является Git-репозиторием
pub fn create_vc(repo_dir: impl AsRef<Path>) -> Result<Option<GitVersionControl>> {
    let repo_dir = repo_dir.as_ref();
    if repo_dir.join(".git").exists() {
        Ok(Some(GitVersionControl::open(repo_dir)?))
    } else {
        Ok(None)
    }
}
