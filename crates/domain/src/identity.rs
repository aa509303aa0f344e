//! The secret role/faction/rank record bound to a seat.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AccessToken, SeatId};

/// Hard cap on partial disclosures per seat.
pub const MAX_REVEALS: usize = 3;

/// Faction membership. Phoenix shows red, Gargoyle shows blue; the
/// Neutral inquisitor belongs to neither clan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Faction {
    Phoenix,
    Gargoyle,
    Neutral,
}

/// One partial, irreversible disclosure of faction information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevealKind {
    Red,
    Blue,
    Unknown,
}

/// Marked token handed out during the one-shot secret-card allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretCard {
    Real,
    Fake,
}

/// The faction color the neutral seat shows to the next player around
/// the table. Fixed by a single coin flip at assignment time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayedColor {
    Red,
    Blue,
}

/// The identity record for one seat. Owned exclusively by its room;
/// redrawn wholesale on restart (only `display_name` survives, keyed
/// by seat id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerIdentity {
    pub seat_id: SeatId,
    /// 1..=9 for clan roles, 10 for the neutral inquisitor. Meaningful
    /// only within a faction: two clans may hold the same rank.
    pub role_rank: u8,
    pub faction: Faction,
    pub revealed_faction: bool,
    pub revealed_rank: bool,
    /// Ordered disclosures, never longer than [`MAX_REVEALS`].
    pub reveals: Vec<RevealKind>,
    pub access_token: AccessToken,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub is_online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<DateTime<Utc>>,
    /// `None` until the allocation protocol hands this seat a card.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_secret_card: Option<SecretCard>,
    /// One-way false -> true; reset only by a full room restart.
    pub secret_cards_committed: bool,
    /// Present only on the neutral identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub displayed_faction_to_next: Option<DisplayedColor>,
}

impl PlayerIdentity {
    pub fn is_neutral(&self) -> bool {
        self.faction == Faction::Neutral
    }

    /// Append a reveal if the cap allows it. Returns whether the list
    /// changed; a call past the cap is a no-op, not an error.
    pub fn append_reveal(&mut self, kind: RevealKind) -> bool {
        if self.reveals.len() >= MAX_REVEALS {
            return false;
        }
        self.reveals.push(kind);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::AccessToken;

    fn identity() -> PlayerIdentity {
        PlayerIdentity {
            seat_id: SeatId::new(1),
            role_rank: 4,
            faction: Faction::Phoenix,
            revealed_faction: false,
            revealed_rank: false,
            reveals: Vec::new(),
            access_token: AccessToken::generate(&mut rand::thread_rng()),
            display_name: None,
            is_online: false,
            last_seen_at: None,
            has_secret_card: None,
            secret_cards_committed: false,
            displayed_faction_to_next: None,
        }
    }

    #[test]
    fn fourth_reveal_is_a_silent_no_op() {
        let mut id = identity();
        assert!(id.append_reveal(RevealKind::Red));
        assert!(id.append_reveal(RevealKind::Blue));
        assert!(id.append_reveal(RevealKind::Unknown));
        assert!(!id.append_reveal(RevealKind::Red));
        assert_eq!(
            id.reveals,
            vec![RevealKind::Red, RevealKind::Blue, RevealKind::Unknown]
        );
    }

    #[test]
    fn serializes_with_camel_case_wire_names() {
        let id = identity();
        let json = serde_json::to_value(&id).expect("serialize");
        assert!(json.get("seatId").is_some());
        assert!(json.get("roleRank").is_some());
        assert!(json.get("secretCardsCommitted").is_some());
        // Absent optionals stay off the wire
        assert!(json.get("displayName").is_none());
        assert!(json.get("hasSecretCard").is_none());
    }

    #[test]
    fn faction_uses_lowercase_wire_names() {
        assert_eq!(
            serde_json::to_string(&Faction::Phoenix).expect("serialize"),
            "\"phoenix\""
        );
        assert_eq!(
            serde_json::to_string(&RevealKind::Unknown).expect("serialize"),
            "\"unknown\""
        );
    }
}
