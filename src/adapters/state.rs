use serde::Serialize;
use std::fmt;

/// 适配器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterState {
    Uninitialized,
    Initializing,
    Ready,
    Error,
    CleaningUp,
    CleanedUp,
}

impl AdapterState {
    pub fn as_str(self) -> &'static str {
        match self {
            AdapterState::Uninitialized => "uninitialized",
            AdapterState::Initializing => "initializing",
            AdapterState::Ready => "ready",
            AdapterState::Error => "error",
            AdapterState::CleaningUp => "cleaning_up",
            AdapterState::CleanedUp => "cleaned_up",
        }
    }

    /// 状态转换表
    ///
    /// 任意非 `Error` 状态都可以进入 `Error`；自转换由调用方按无操作处理。
    pub fn can_transition_to(self, next: AdapterState) -> bool {
        use AdapterState::*;

        if next == Error {
            return self != Error;
        }
        matches!(
            (self, next),
            (Uninitialized, Initializing)
                | (Initializing, Ready)
                | (Ready, Initializing)
                | (Ready, CleaningUp)
                | (Error, Initializing)
                | (Error, CleaningUp)
                | (CleaningUp, CleanedUp)
                | (CleanedUp, Initializing)
        )
    }

    /// 是否有需要清理的资源
    pub fn needs_cleanup(self) -> bool {
        matches!(
            self,
            AdapterState::Initializing | AdapterState::Ready | AdapterState::Error
        )
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::AdapterState::*;
    use super::*;

    #[test]
    fn test_lifecycle_path_is_allowed() {
        assert!(Uninitialized.can_transition_to(Initializing));
        assert!(Initializing.can_transition_to(Ready));
        assert!(Ready.can_transition_to(CleaningUp));
        assert!(CleaningUp.can_transition_to(CleanedUp));
        assert!(CleanedUp.can_transition_to(Initializing));
        // 重新初始化
        assert!(Ready.can_transition_to(Initializing));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!Uninitialized.can_transition_to(Ready));
        assert!(!Ready.can_transition_to(Uninitialized));
        assert!(!Initializing.can_transition_to(CleaningUp));
        assert!(!CleanedUp.can_transition_to(Ready));
        assert!(!Error.can_transition_to(Ready));
        assert!(!Error.can_transition_to(Error));
    }

    #[test]
    fn test_any_state_can_fail() {
        for state in [Uninitialized, Initializing, Ready, CleaningUp, CleanedUp] {
            assert!(state.can_transition_to(Error), "{state} -> error");
        }
    }

    #[test]
    fn test_string_forms() {
        assert_eq!(CleaningUp.to_string(), "cleaning_up");
        assert_eq!(serde_json::to_string(&CleanedUp).unwrap(), "\"cleaned_up\"");
    }
}
