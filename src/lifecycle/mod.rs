use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// SOS 告警状态机：ACTIVE → RESPONDED → RESOLVED，
/// 任意非终态可转 FALSE_ALARM。RESOLVED / FALSE_ALARM 为终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    Active,
    Responded,
    Resolved,
    FalseAlarm,
}

impl AlertStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, AlertStatus::Resolved | AlertStatus::FalseAlarm)
    }

    /// 响应采用先到先得：只有 ACTIVE 可以被认领，
    /// 已有响应者的告警再次认领视为冲突。
    pub fn can_respond(self) -> bool {
        self == AlertStatus::Active
    }

    pub fn can_resolve(self) -> bool {
        matches!(self, AlertStatus::Active | AlertStatus::Responded)
    }

    pub fn can_mark_false_alarm(self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertStatus::Active => "ACTIVE",
            AlertStatus::Responded => "RESPONDED",
            AlertStatus::Resolved => "RESOLVED",
            AlertStatus::FalseAlarm => "FALSE_ALARM",
        };
        f.write_str(s)
    }
}

impl FromStr for AlertStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(AlertStatus::Active),
            "RESPONDED" => Ok(AlertStatus::Responded),
            "RESOLVED" => Ok(AlertStatus::Resolved),
            "FALSE_ALARM" => Ok(AlertStatus::FalseAlarm),
            _ => Err(InvalidStatus(s.to_string())),
        }
    }
}

/// 帮助请求状态机：OPEN → ASSIGNED → IN_PROGRESS → COMPLETED，
/// 非终态均可 CANCELLED。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HelpStatus {
    Open,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl HelpStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, HelpStatus::Completed | HelpStatus::Cancelled)
    }

    pub fn can_transition(self, to: HelpStatus) -> bool {
        use HelpStatus::*;
        match (self, to) {
            (Open, Assigned) => true,
            (Assigned, InProgress) => true,
            (InProgress, Completed) => true,
            // 跳过 IN_PROGRESS 直接完成也允许，中间态不强制
            (Assigned, Completed) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for HelpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HelpStatus::Open => "OPEN",
            HelpStatus::Assigned => "ASSIGNED",
            HelpStatus::InProgress => "IN_PROGRESS",
            HelpStatus::Completed => "COMPLETED",
            HelpStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

impl FromStr for HelpStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(HelpStatus::Open),
            "ASSIGNED" => Ok(HelpStatus::Assigned),
            "IN_PROGRESS" => Ok(HelpStatus::InProgress),
            "COMPLETED" => Ok(HelpStatus::Completed),
            "CANCELLED" => Ok(HelpStatus::Cancelled),
            _ => Err(InvalidStatus(s.to_string())),
        }
    }
}

/// 献血请求状态。带 fulfilled_units 的更新会按规则重算状态，
/// 数值减小同样按规则回退。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BloodRequestStatus {
    Active,
    PartiallyFulfilled,
    Fulfilled,
    Expired,
    Cancelled,
}

impl BloodRequestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BloodRequestStatus::Fulfilled
                | BloodRequestStatus::Expired
                | BloodRequestStatus::Cancelled
        )
    }

    /// 显式状态改写只允许在非终态上
    pub fn can_set_status(self) -> bool {
        !self.is_terminal()
    }

    /// 单位数重算可以让 FULFILLED 回退，
    /// 但不能复活已取消或已过期的请求。
    pub fn can_update_units(self) -> bool {
        !matches!(
            self,
            BloodRequestStatus::Expired | BloodRequestStatus::Cancelled
        )
    }
}

impl fmt::Display for BloodRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BloodRequestStatus::Active => "ACTIVE",
            BloodRequestStatus::PartiallyFulfilled => "PARTIALLY_FULFILLED",
            BloodRequestStatus::Fulfilled => "FULFILLED",
            BloodRequestStatus::Expired => "EXPIRED",
            BloodRequestStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

impl FromStr for BloodRequestStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(BloodRequestStatus::Active),
            "PARTIALLY_FULFILLED" => Ok(BloodRequestStatus::PartiallyFulfilled),
            "FULFILLED" => Ok(BloodRequestStatus::Fulfilled),
            "EXPIRED" => Ok(BloodRequestStatus::Expired),
            "CANCELLED" => Ok(BloodRequestStatus::Cancelled),
            _ => Err(InvalidStatus(s.to_string())),
        }
    }
}

/// 按已满足单位数重算献血请求状态
pub fn blood_status_for_units(units_needed: i32, fulfilled_units: i32) -> BloodRequestStatus {
    if fulfilled_units >= units_needed {
        BloodRequestStatus::Fulfilled
    } else if fulfilled_units > 0 {
        BloodRequestStatus::PartiallyFulfilled
    } else {
        BloodRequestStatus::Active
    }
}

/// 志愿者审核状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VerificationStatus::Pending => "PENDING",
            VerificationStatus::Verified => "VERIFIED",
            VerificationStatus::Rejected => "REJECTED",
        };
        f.write_str(s)
    }
}

impl FromStr for VerificationStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(VerificationStatus::Pending),
            "VERIFIED" => Ok(VerificationStatus::Verified),
            "REJECTED" => Ok(VerificationStatus::Rejected),
            _ => Err(InvalidStatus(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidStatus(pub String);

impl fmt::Display for InvalidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid status value: {}", self.0)
    }
}

impl std::error::Error for InvalidStatus {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_respond_is_first_claim_wins() {
        assert!(AlertStatus::Active.can_respond());
        assert!(!AlertStatus::Responded.can_respond());
        assert!(!AlertStatus::Resolved.can_respond());
        assert!(!AlertStatus::FalseAlarm.can_respond());
    }

    #[test]
    fn alert_resolve_from_active_or_responded_only() {
        assert!(AlertStatus::Active.can_resolve());
        assert!(AlertStatus::Responded.can_resolve());
        assert!(!AlertStatus::Resolved.can_resolve());
        assert!(!AlertStatus::FalseAlarm.can_resolve());
    }

    #[test]
    fn false_alarm_from_any_non_terminal_state() {
        assert!(AlertStatus::Active.can_mark_false_alarm());
        assert!(AlertStatus::Responded.can_mark_false_alarm());
        assert!(!AlertStatus::Resolved.can_mark_false_alarm());
        assert!(!AlertStatus::FalseAlarm.can_mark_false_alarm());
    }

    #[test]
    fn help_status_happy_path_and_cancel() {
        assert!(HelpStatus::Open.can_transition(HelpStatus::Assigned));
        assert!(HelpStatus::Assigned.can_transition(HelpStatus::InProgress));
        assert!(HelpStatus::InProgress.can_transition(HelpStatus::Completed));
        assert!(HelpStatus::Open.can_transition(HelpStatus::Cancelled));
        assert!(!HelpStatus::Completed.can_transition(HelpStatus::Cancelled));
        assert!(!HelpStatus::Completed.can_transition(HelpStatus::Open));
        assert!(!HelpStatus::Open.can_transition(HelpStatus::InProgress));
    }

    #[test]
    fn blood_status_recomputed_from_units() {
        assert_eq!(
            blood_status_for_units(2, 1),
            BloodRequestStatus::PartiallyFulfilled
        );
        assert_eq!(blood_status_for_units(2, 2), BloodRequestStatus::Fulfilled);
        assert_eq!(blood_status_for_units(2, 3), BloodRequestStatus::Fulfilled);
        // 数值回落时状态同样回退
        assert_eq!(blood_status_for_units(2, 0), BloodRequestStatus::Active);
    }

    #[test]
    fn cancelled_and_expired_blood_requests_stay_closed() {
        assert!(!BloodRequestStatus::Cancelled.can_set_status());
        assert!(!BloodRequestStatus::Cancelled.can_update_units());
        assert!(!BloodRequestStatus::Expired.can_set_status());
        assert!(!BloodRequestStatus::Expired.can_update_units());
    }

    #[test]
    fn fulfilled_reopens_only_through_unit_recompute() {
        assert!(!BloodRequestStatus::Fulfilled.can_set_status());
        assert!(BloodRequestStatus::Fulfilled.can_update_units());
        assert!(BloodRequestStatus::Active.can_set_status());
        assert!(BloodRequestStatus::PartiallyFulfilled.can_update_units());
    }

    #[test]
    fn status_strings_round_trip() {
        for s in ["ACTIVE", "RESPONDED", "RESOLVED", "FALSE_ALARM"] {
            assert_eq!(s.parse::<AlertStatus>().unwrap().to_string(), s);
        }
        assert!("RESPONDING".parse::<AlertStatus>().is_err());
        assert!("open".parse::<HelpStatus>().is_err());
    }
}
