use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::geo::{self, GeoPoint};
use crate::lifecycle::VerificationStatus;

/// 血型按字面值精确匹配，不做万能供血者换算
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BloodType {
    APositive,
    ANegative,
    BPositive,
    BNegative,
    AbPositive,
    AbNegative,
    OPositive,
    ONegative,
}

impl fmt::Display for BloodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BloodType::APositive => "A_POSITIVE",
            BloodType::ANegative => "A_NEGATIVE",
            BloodType::BPositive => "B_POSITIVE",
            BloodType::BNegative => "B_NEGATIVE",
            BloodType::AbPositive => "AB_POSITIVE",
            BloodType::AbNegative => "AB_NEGATIVE",
            BloodType::OPositive => "O_POSITIVE",
            BloodType::ONegative => "O_NEGATIVE",
        };
        f.write_str(s)
    }
}

impl FromStr for BloodType {
    type Err = InvalidBloodType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A_POSITIVE" => Ok(BloodType::APositive),
            "A_NEGATIVE" => Ok(BloodType::ANegative),
            "B_POSITIVE" => Ok(BloodType::BPositive),
            "B_NEGATIVE" => Ok(BloodType::BNegative),
            "AB_POSITIVE" => Ok(BloodType::AbPositive),
            "AB_NEGATIVE" => Ok(BloodType::AbNegative),
            "O_POSITIVE" => Ok(BloodType::OPositive),
            "O_NEGATIVE" => Ok(BloodType::ONegative),
            _ => Err(InvalidBloodType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidBloodType(pub String);

impl fmt::Display for InvalidBloodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid blood type: {}", self.0)
    }
}

impl std::error::Error for InvalidBloodType {}

/// 单次匹配产出的候选，随查询生成、不落库、不跨请求缓存
#[derive(Debug, Clone, Serialize)]
pub struct MatchCandidate {
    pub id: String,
    pub user_id: String,
    pub distance_km: Option<f64>,
    pub score: u32,
}

#[derive(Debug, Clone)]
pub struct DonorCandidate {
    pub donor_id: String,
    pub user_id: String,
    pub blood_type: BloodType,
    pub is_available: bool,
    pub medical_eligibility: bool,
    pub emergency_donor: bool,
    pub location: Option<GeoPoint>,
}

/// 常规献血者匹配：可用 + 体检合格 + 血型完全一致。
/// 不强加排序，保持候选池原有顺序；无人匹配返回空集而非错误。
pub fn match_donors(blood_type: BloodType, pool: &[DonorCandidate]) -> Vec<MatchCandidate> {
    pool.iter()
        .filter(|d| d.is_available && d.medical_eligibility && d.blood_type == blood_type)
        .map(|d| MatchCandidate {
            id: d.donor_id.clone(),
            user_id: d.user_id.clone(),
            distance_km: None,
            score: 1,
        })
        .collect()
}

/// 紧急献血者匹配：在常规条件上要求紧急献血标记，
/// 且位于调用方给定半径内，按距离升序排列。
pub fn match_emergency_donors(
    blood_type: BloodType,
    center: GeoPoint,
    radius_km: f64,
    pool: &[DonorCandidate],
) -> Vec<MatchCandidate> {
    let mut matched: Vec<MatchCandidate> = pool
        .iter()
        .filter(|d| {
            d.is_available && d.medical_eligibility && d.emergency_donor
                && d.blood_type == blood_type
        })
        .filter_map(|d| {
            let loc = d.location?;
            let dist = geo::distance_km(center, loc);
            if dist <= radius_km {
                Some(MatchCandidate {
                    id: d.donor_id.clone(),
                    user_id: d.user_id.clone(),
                    distance_km: Some(dist),
                    score: 2,
                })
            } else {
                None
            }
        })
        .collect();

    matched.sort_by(|a, b| {
        a.distance_km
            .partial_cmp(&b.distance_km)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matched
}

#[derive(Debug, Clone)]
pub struct VolunteerCandidate {
    pub volunteer_id: String,
    pub user_id: String,
    pub is_available: bool,
    pub verification_status: VerificationStatus,
    /// 志愿者自己声明的出行半径（公里），匹配用的是这个值而不是请求方的
    pub max_distance_km: f64,
    pub skill_ids: Vec<String>,
    pub location: Option<GeoPoint>,
}

/// 志愿者匹配：可用 + 已审核通过，按需与技能集求交，
/// 且请求位置落在志愿者自己的出行半径内。按距离升序排列，
/// score 为命中的必备技能数。
pub fn match_volunteers(
    request_location: GeoPoint,
    required_skill_ids: Option<&[String]>,
    pool: &[VolunteerCandidate],
) -> Vec<MatchCandidate> {
    let mut matched: Vec<MatchCandidate> = pool
        .iter()
        .filter(|v| v.is_available && v.verification_status == VerificationStatus::Verified)
        .filter_map(|v| {
            let score = match required_skill_ids {
                Some(required) if !required.is_empty() => {
                    let hits = required
                        .iter()
                        .filter(|s| v.skill_ids.contains(s))
                        .count() as u32;
                    if hits == 0 {
                        return None;
                    }
                    hits
                }
                _ => 0,
            };

            let loc = v.location?;
            let dist = geo::distance_km(request_location, loc);
            if dist <= v.max_distance_km {
                Some(MatchCandidate {
                    id: v.volunteer_id.clone(),
                    user_id: v.user_id.clone(),
                    distance_km: Some(dist),
                    score,
                })
            } else {
                None
            }
        })
        .collect();

    matched.sort_by(|a, b| {
        a.distance_km
            .partial_cmp(&b.distance_km)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matched
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    fn donor(id: &str, blood_type: BloodType) -> DonorCandidate {
        DonorCandidate {
            donor_id: id.into(),
            user_id: format!("user-{}", id),
            blood_type,
            is_available: true,
            medical_eligibility: true,
            emergency_donor: false,
            location: None,
        }
    }

    fn volunteer(id: &str, lat: f64, lon: f64, max_km: f64) -> VolunteerCandidate {
        VolunteerCandidate {
            volunteer_id: id.into(),
            user_id: format!("user-{}", id),
            is_available: true,
            verification_status: VerificationStatus::Verified,
            max_distance_km: max_km,
            skill_ids: vec![],
            location: Some(p(lat, lon)),
        }
    }

    #[test]
    fn donor_blood_type_is_exact_equality() {
        let pool = vec![
            donor("d1", BloodType::ONegative),
            donor("d2", BloodType::APositive),
        ];
        let matched = match_donors(BloodType::APositive, &pool);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "d2");
    }

    #[test]
    fn unavailable_or_ineligible_donors_excluded() {
        let mut d1 = donor("d1", BloodType::BPositive);
        d1.is_available = false;
        let mut d2 = donor("d2", BloodType::BPositive);
        d2.medical_eligibility = false;
        assert!(match_donors(BloodType::BPositive, &[d1, d2]).is_empty());
    }

    #[test]
    fn empty_pool_is_not_an_error() {
        assert!(match_donors(BloodType::ONegative, &[]).is_empty());
        assert!(match_volunteers(p(0.0, 0.0), None, &[]).is_empty());
    }

    #[test]
    fn emergency_donors_sorted_by_distance() {
        let center = p(0.0, 0.0);
        let mut far = donor("far", BloodType::OPositive);
        far.emergency_donor = true;
        far.location = Some(p(0.0, 0.04));
        let mut near = donor("near", BloodType::OPositive);
        near.emergency_donor = true;
        near.location = Some(p(0.0, 0.01));
        let mut outside = donor("outside", BloodType::OPositive);
        outside.emergency_donor = true;
        outside.location = Some(p(1.0, 1.0));
        let mut not_emergency = donor("plain", BloodType::OPositive);
        not_emergency.location = Some(p(0.0, 0.01));

        let matched =
            match_emergency_donors(BloodType::OPositive, center, 10.0, &[far, near, outside, not_emergency]);
        let ids: Vec<&str> = matched.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "far"]);
    }

    #[test]
    fn unverified_volunteers_excluded_even_in_range() {
        let mut v = volunteer("v1", 0.0, 0.01, 50.0);
        v.verification_status = VerificationStatus::Pending;
        assert!(match_volunteers(p(0.0, 0.0), None, &[v]).is_empty());
    }

    #[test]
    fn volunteer_matching_uses_candidate_own_radius() {
        // 距离约 11 公里：出行半径 5 公里的排除，20 公里的保留
        let short_range = volunteer("short", 0.1, 0.0, 5.0);
        let long_range = volunteer("long", 0.1, 0.0, 20.0);
        let matched = match_volunteers(p(0.0, 0.0), None, &[short_range, long_range]);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "long");
    }

    #[test]
    fn required_skills_intersection_and_score() {
        let mut medic = volunteer("medic", 0.0, 0.01, 50.0);
        medic.skill_ids = vec!["first-aid".into(), "driving".into()];
        let mut cook = volunteer("cook", 0.0, 0.01, 50.0);
        cook.skill_ids = vec!["cooking".into()];

        let required = vec!["first-aid".to_string(), "driving".to_string()];
        let matched = match_volunteers(p(0.0, 0.0), Some(&required), &[medic, cook]);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "medic");
        assert_eq!(matched[0].score, 2);
    }

    #[test]
    fn volunteer_without_location_is_skipped() {
        let mut v = volunteer("v1", 0.0, 0.0, 50.0);
        v.location = None;
        assert!(match_volunteers(p(0.0, 0.0), None, &[v]).is_empty());
    }

    #[test]
    fn blood_type_strings_round_trip() {
        for s in [
            "A_POSITIVE",
            "A_NEGATIVE",
            "B_POSITIVE",
            "B_NEGATIVE",
            "AB_POSITIVE",
            "AB_NEGATIVE",
            "O_POSITIVE",
            "O_NEGATIVE",
        ] {
            assert_eq!(s.parse::<BloodType>().unwrap().to_string(), s);
        }
        assert!("O+".parse::<BloodType>().is_err());
    }
}
