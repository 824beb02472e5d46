//! Git access for GitDoc
//!
//! [`Repository`] is the contract the rest of the crate works against;
//! [`GitRepo`] implements it on top of libgit2 and the `git` executable.

mod command;
mod handle;
mod repo;

pub use handle::{
    Change, CommitOptions, ForcePushMode, Ref, RefType, RepoId, Repository, RepositoryState,
};
pub use repo::GitRepo;
