//! Domain identifiers
//!
//! # ID の種類
//! - **InstanceId / ListenerId**: ULID ベースで自動生成（生成順にソート可能）
//! - **DefinitionId**: 登録する側が決める文字列
//!
//! ## Phantom Type パターン
//! `Id<T>` は実行時には使わないマーカー型 `T` を持つ。
//! 中身はどちらも `Ulid` だが、`InstanceId` を `ListenerId` の位置に渡すとコンパイルエラーになる。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait for generated id kinds.
pub trait IdMarker: Send + Sync + 'static {
    /// Prefix used by `Display` (e.g. "inst-").
    fn prefix() -> &'static str;
}

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Instance {}

impl IdMarker for Instance {
    fn prefix() -> &'static str {
        "inst-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Listener {}

impl IdMarker for Listener {
    fn prefix() -> &'static str {
        "listener-"
    }
}

/// Identifier of one scheduled/executed occurrence of a definition.
pub type InstanceId = Id<Instance>;

/// Handle returned by `TaskScheduler::on`, used to unsubscribe.
pub type ListenerId = Id<Listener>;

/// Identifier of a task definition, chosen at registration time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DefinitionId(String);

impl DefinitionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DefinitionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DefinitionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
