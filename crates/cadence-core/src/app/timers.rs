//! Timers - arm 済み timer の管理（定義の schedule、遅延インスタンス、cleanup loop）

use std::collections::HashMap;

use tokio::task::AbortHandle;

use crate::domain::{DefinitionId, InstanceId};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerKey {
    Definition(DefinitionId),
    Instance(InstanceId),
    Cleanup,
}

/// Generation token handed to a timer task when it is armed.
///
/// A timer task checks its token under the scheduler lock before acting, so a
/// fire racing with `disarm`/`stop` (or a re-arm under the same key) is a no-op.
pub type TimerToken = u64;

#[derive(Debug, Default)]
pub struct TimerRegistry {
    timers: HashMap<TimerKey, (TimerToken, AbortHandle)>,
    next_token: TimerToken,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_token(&mut self) -> TimerToken {
        self.next_token += 1;
        self.next_token
    }

    /// Store a timer, aborting whatever was armed under the same key.
    pub fn arm(&mut self, key: TimerKey, token: TimerToken, handle: AbortHandle) {
        if let Some((_, previous)) = self.timers.insert(key, (token, handle)) {
            previous.abort();
        }
    }

    pub fn is_current(&self, key: &TimerKey, token: TimerToken) -> bool {
        matches!(self.timers.get(key), Some((current, _)) if *current == token)
    }

    /// Remove the entry if `token` still owns it. Used by one-shot timers on fire.
    pub fn take_if_current(&mut self, key: &TimerKey, token: TimerToken) -> bool {
        if self.is_current(key, token) {
            self.timers.remove(key);
            true
        } else {
            false
        }
    }

    pub fn disarm(&mut self, key: &TimerKey) -> bool {
        match self.timers.remove(key) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn disarm_all(&mut self) -> usize {
        let count = self.timers.len();
        for (_, (_, handle)) in self.timers.drain() {
            handle.abort();
        }
        count
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sleeper() -> AbortHandle {
        tokio::spawn(tokio::time::sleep(Duration::from_secs(3600))).abort_handle()
    }

    #[tokio::test]
    async fn rearm_invalidates_previous_token() {
        let mut timers = TimerRegistry::new();
        let key = TimerKey::Definition(DefinitionId::from("t1"));

        let first_token = timers.next_token();
        timers.arm(key.clone(), first_token, sleeper());

        let second_token = timers.next_token();
        timers.arm(key.clone(), second_token, sleeper());

        assert!(!timers.is_current(&key, first_token));
        assert!(timers.is_current(&key, second_token));
    }

    #[tokio::test]
    async fn take_if_current_only_for_owner() {
        let mut timers = TimerRegistry::new();
        let key = TimerKey::Cleanup;
        let token = timers.next_token();
        timers.arm(key.clone(), token, sleeper());

        assert!(!timers.take_if_current(&key, token + 1));
        assert!(timers.take_if_current(&key, token));
        assert!(!timers.is_current(&key, token));
        assert_eq!(timers.len(), 0);
    }

    #[tokio::test]
    async fn disarm_all_empties_registry() {
        let mut timers = TimerRegistry::new();
        for name in ["a", "b"] {
            let token = timers.next_token();
            timers.arm(TimerKey::Definition(DefinitionId::from(name)), token, sleeper());
        }
        assert_eq!(timers.disarm_all(), 2);
        assert_eq!(timers.len(), 0);
    }
}
