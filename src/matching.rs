//! Candidate sifting and match scoring.

use tracing::debug;

use crate::config::ScoreWeights;
use crate::profile::{Match, User};
use crate::utils::common;
use crate::vk::models::RawCandidate;

/// Relation codes that disqualify a candidate: in a relationship, engaged,
/// married, in love, or in a civil union. An absent relation passes.
const EXCLUDED_RELATIONS: &[i64] = &[2, 3, 4, 7, 8];

/// How often the sifting loop reports progress.
const PROGRESS_EVERY: usize = 250;

fn eligible(candidate: &RawCandidate) -> bool {
    candidate.blacklisted == 0
        && candidate.blacklisted_by_me == 0
        && !EXCLUDED_RELATIONS.contains(&candidate.relation.unwrap_or(0))
        && !candidate.is_closed
        && candidate.deactivated.is_none()
}

/// Filters search results down to approachable candidates, returning their
/// ids in input order.
pub fn sift(candidates: &[RawCandidate]) -> Vec<String> {
    let mut kept = Vec::new();
    for (index, candidate) in candidates.iter().enumerate() {
        if eligible(candidate) {
            kept.push(candidate.id.to_string());
        }
        if (index + 1) % PROGRESS_EVERY == 0 {
            debug!(screened = index + 1, kept = kept.len(), "sifting candidates");
        }
    }
    debug!(
        screened = candidates.len(),
        kept = kept.len(),
        "sifting done"
    );
    kept
}

/// Fills in the four weighted score components. The reserved base component
/// is left untouched.
pub fn score(m: &mut Match, user: &User, weights: &ScoreWeights) {
    let mut interests = 0i64;
    for (attr, tokens) in &user.interests {
        if let Some(theirs) = m.interests.get(attr) {
            interests += weights.interests * common(tokens, theirs) as i64;
        }
    }
    m.interests_score = interests;

    let shared_personal = user
        .personal
        .iter()
        .filter(|(attr, value)| m.personal.get(*attr) == Some(value))
        .count();
    m.personal_score = weights.personal * shared_personal as i64;

    m.friends_score = weights.friends * m.common_friends;

    let shared_groups = user.groups.intersection(&m.groups).count();
    m.groups_score = weights.groups * shared_groups as i64;
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use indexmap::IndexMap;

    use crate::profile::Sex;
    use crate::utils::normalize;

    use super::*;

    fn candidate(id: i64) -> RawCandidate {
        RawCandidate {
            id,
            blacklisted: 0,
            blacklisted_by_me: 0,
            relation: None,
            is_closed: false,
            deactivated: None,
        }
    }

    fn blank_user() -> User {
        User {
            uid: 1,
            name: "A".into(),
            surname: "B".into(),
            sex: Sex::Female,
            age: 25,
            city: 1,
            personal: IndexMap::new(),
            interests: IndexMap::new(),
            groups: BTreeSet::new(),
        }
    }

    fn blank_match(uid: i64) -> Match {
        Match {
            uid,
            name: "C".into(),
            surname: "D".into(),
            common_friends: 0,
            personal: IndexMap::new(),
            interests: IndexMap::new(),
            groups: BTreeSet::new(),
            photos: vec![],
            base_score: 0,
            interests_score: 0,
            personal_score: 0,
            friends_score: 0,
            groups_score: 0,
        }
    }

    #[test]
    fn sift_drops_taken_blocked_and_closed() {
        let mut taken = candidate(2);
        taken.relation = Some(3);
        let mut blocked = candidate(3);
        blocked.blacklisted = 1;
        let mut blocker = candidate(4);
        blocker.blacklisted_by_me = 1;
        let mut closed = candidate(5);
        closed.is_closed = true;
        let mut gone = candidate(6);
        gone.deactivated = Some("banned".into());
        let mut single = candidate(7);
        single.relation = Some(1);

        let kept = sift(&[candidate(1), taken, blocked, blocker, closed, gone, single]);
        assert_eq!(kept, vec!["1".to_string(), "7".to_string()]);
    }

    #[test]
    fn score_components_sum_into_total() {
        let mut user = blank_user();
        user.interests
            .insert("music".into(), normalize("rock, jazz, metal"));
        user.personal.insert("smoking".into(), "1".into());
        user.personal.insert("alcohol".into(), "2".into());
        user.groups = BTreeSet::from([10, 20, 30]);

        let mut m = blank_match(2);
        m.interests.insert("music".into(), normalize("Jazz, Metal"));
        m.personal.insert("smoking".into(), "1".into());
        m.personal.insert("alcohol".into(), "3".into());
        m.common_friends = 4;
        m.groups = BTreeSet::from([20, 40]);

        let weights = ScoreWeights {
            interests: 10,
            personal: 20,
            friends: 30,
            groups: 10,
        };
        score(&mut m, &user, &weights);

        assert_eq!(m.interests_score, 20); // jazz, metal
        assert_eq!(m.personal_score, 20); // smoking only
        assert_eq!(m.friends_score, 120);
        assert_eq!(m.groups_score, 10); // group 20
        assert_eq!(m.base_score, 0);
        assert_eq!(m.total_score(), 170);
    }

    #[test]
    fn score_is_zero_without_overlap() {
        let user = blank_user();
        let mut m = blank_match(2);
        score(&mut m, &user, &ScoreWeights::default());
        assert_eq!(m.total_score(), 0);
    }

    #[test]
    fn more_overlap_never_lowers_the_score() {
        let mut user = blank_user();
        user.interests.insert("music".into(), normalize("rock, jazz"));

        let weights = ScoreWeights::default();
        let mut one = blank_match(2);
        one.interests.insert("music".into(), normalize("rock"));
        score(&mut one, &user, &weights);

        let mut two = blank_match(3);
        two.interests.insert("music".into(), normalize("rock, jazz"));
        score(&mut two, &user, &weights);

        assert!(two.total_score() >= one.total_score());
    }
}
