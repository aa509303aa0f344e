//! The room aggregate.
//!
//! A room owns its identity list outright; no identity outlives its
//! room. All mutations here are synchronous - the engine serializes
//! them per room, so the aggregate never needs its own lock.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::assign::assign_identities;
use crate::error::DomainError;
use crate::identity::{PlayerIdentity, RevealKind, SecretCard};
use crate::ids::{RoomId, SeatId};

pub const MIN_PLAYERS: u8 = 6;
pub const MAX_PLAYERS: u8 = 12;

/// Session phase. Starts `Waiting`, becomes `Playing` on the first
/// start or any restart and never reverts. `Ended` is declared in the
/// data model but no component ever transitions into it; it is
/// reserved for future scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Waiting,
    Playing,
    Ended,
}

/// Fixed secret-card counts by declared room size: (real, fake).
///
/// Sizes without an entry allow no distribution; they fall back to
/// zero of each, which is unreachable in practice because only odd
/// counts have a neutral seat to act.
pub fn expected_allocation(declared_count: u8) -> (u8, u8) {
    match declared_count {
        7 => (1, 1),
        9 => (1, 2),
        11 => (1, 3),
        _ => (0, 0),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub declared_count: u8,
    pub phase: Phase,
    /// Ordered by seat id; `identities.len() == declared_count` always.
    pub identities: Vec<PlayerIdentity>,
    /// Seats with a live connection. Excludes the host, which is a
    /// distinct binding rather than a seat.
    pub connected_seats: BTreeSet<SeatId>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl Room {
    pub fn new(
        id: RoomId,
        declared_count: u8,
        rng: &mut impl Rng,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let identities = assign_identities(declared_count, rng)?;
        Ok(Self {
            id,
            declared_count,
            phase: Phase::Waiting,
            identities,
            connected_seats: BTreeSet::new(),
            created_at: now,
            last_activity_at: now,
        })
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
    }

    pub fn is_expired(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now - self.last_activity_at > window
    }

    pub fn identity(&self, seat: SeatId) -> Option<&PlayerIdentity> {
        self.identities.iter().find(|i| i.seat_id == seat)
    }

    fn identity_mut(&mut self, seat: SeatId) -> Result<&mut PlayerIdentity, DomainError> {
        self.identities
            .iter_mut()
            .find(|i| i.seat_id == seat)
            .ok_or(DomainError::SeatNotFound(seat.value()))
    }

    pub fn connected_seat_ids(&self) -> Vec<SeatId> {
        self.connected_seats.iter().copied().collect()
    }

    /// First start or any later call: the phase moves to (or stays at)
    /// `Playing`. Idempotent by design so the host can re-fetch state.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.phase = Phase::Playing;
        self.touch(now);
    }

    /// Redraw every identity. Only the seat -> display name mapping
    /// survives; ranks, factions, tokens, reveals and the commitment
    /// flag are all fresh.
    pub fn restart(
        &mut self,
        rng: &mut impl Rng,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let saved_names: BTreeMap<SeatId, String> = self
            .identities
            .iter()
            .filter_map(|i| i.display_name.clone().map(|n| (i.seat_id, n)))
            .collect();

        let mut identities = assign_identities(self.declared_count, rng)?;
        for identity in &mut identities {
            if let Some(name) = saved_names.get(&identity.seat_id) {
                identity.display_name = Some(name.clone());
            }
        }

        self.identities = identities;
        self.phase = Phase::Playing;
        self.touch(now);
        Ok(())
    }

    /// Authoritative last-writer-wins replacement. Concurrent
    /// privileged writers race silently; no merge is attempted.
    pub fn replace_identities(&mut self, identities: Vec<PlayerIdentity>, now: DateTime<Utc>) {
        self.identities = identities;
        self.touch(now);
    }

    /// Append a reveal for `seat`. Returns whether anything changed;
    /// a seat already at the cap absorbs the call silently.
    pub fn append_reveal(
        &mut self,
        seat: SeatId,
        kind: RevealKind,
        now: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        let changed = self.identity_mut(seat)?.append_reveal(kind);
        self.touch(now);
        Ok(changed)
    }

    pub fn set_display_name(
        &mut self,
        seat: SeatId,
        name: String,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.identity_mut(seat)?.display_name = Some(name);
        self.touch(now);
        Ok(())
    }

    pub fn set_presence(
        &mut self,
        seat: SeatId,
        is_online: bool,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if is_online {
            self.connected_seats.insert(seat);
        } else {
            self.connected_seats.remove(&seat);
        }
        let identity = self.identity_mut(seat)?;
        identity.is_online = is_online;
        identity.last_seen_at = Some(now);
        self.touch(now);
        Ok(())
    }

    /// Commit the one-shot secret-card distribution.
    ///
    /// Preconditions are checked in order, each with its own error,
    /// and nothing is applied until all pass - the operation is
    /// all-or-nothing.
    pub fn distribute_secret_cards(
        &mut self,
        acting_seat: SeatId,
        allocation: &BTreeMap<SeatId, Option<SecretCard>>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let acting = self
            .identity(acting_seat)
            .ok_or(DomainError::SeatNotFound(acting_seat.value()))?;
        if !acting.is_neutral() {
            return Err(DomainError::NotNeutralSeat(acting_seat.value()));
        }
        if acting.secret_cards_committed {
            return Err(DomainError::AlreadyDistributed);
        }

        let (expected_real, expected_fake) = expected_allocation(self.declared_count);
        let got_real = allocation
            .values()
            .filter(|c| **c == Some(SecretCard::Real))
            .count() as u8;
        let got_fake = allocation
            .values()
            .filter(|c| **c == Some(SecretCard::Fake))
            .count() as u8;
        if (got_real, got_fake) != (expected_real, expected_fake) {
            return Err(DomainError::AllocationCountMismatch {
                expected_real,
                expected_fake,
                got_real,
                got_fake,
            });
        }
        // Every target seat must resolve before anything is applied,
        // otherwise a mid-loop failure would leave a partial allocation.
        for &seat in allocation.keys() {
            if self.identity(seat).is_none() {
                return Err(DomainError::SeatNotFound(seat.value()));
            }
        }

        for (&seat, &card) in allocation {
            if let Some(card) = card {
                self.identity_mut(seat)?.has_secret_card = Some(card);
            }
        }
        self.identity_mut(acting_seat)?.secret_cards_committed = true;
        self.touch(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Faction;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn room_of(count: u8) -> Room {
        let mut rng = StdRng::seed_from_u64(7);
        Room::new(RoomId::from("123456"), count, &mut rng, Utc::now()).expect("room")
    }

    fn neutral_seat(room: &Room) -> SeatId {
        room.identities
            .iter()
            .find(|i| i.is_neutral())
            .expect("neutral")
            .seat_id
    }

    fn clan_seats(room: &Room) -> Vec<SeatId> {
        room.identities
            .iter()
            .filter(|i| !i.is_neutral())
            .map(|i| i.seat_id)
            .collect()
    }

    #[test]
    fn identities_always_match_declared_count() {
        for count in 6..=12u8 {
            let room = room_of(count);
            assert_eq!(room.identities.len(), count as usize);
            assert_eq!(room.phase, Phase::Waiting);
        }
    }

    #[test]
    fn start_is_idempotent_and_phase_never_reverts() {
        let mut room = room_of(8);
        room.start(Utc::now());
        assert_eq!(room.phase, Phase::Playing);
        room.start(Utc::now());
        assert_eq!(room.phase, Phase::Playing);
    }

    #[test]
    fn reveal_sequence_caps_at_three() {
        let mut room = room_of(8);
        let seat = SeatId::new(2);
        let now = Utc::now();
        for kind in [
            RevealKind::Red,
            RevealKind::Blue,
            RevealKind::Unknown,
            RevealKind::Red,
        ] {
            room.append_reveal(seat, kind, now).expect("seat exists");
        }
        let reveals = &room.identity(seat).expect("seat").reveals;
        assert_eq!(
            *reveals,
            vec![RevealKind::Red, RevealKind::Blue, RevealKind::Unknown]
        );
    }

    #[test]
    fn reveal_on_unknown_seat_is_an_error() {
        let mut room = room_of(8);
        let err = room
            .append_reveal(SeatId::new(9), RevealKind::Red, Utc::now())
            .expect_err("no seat 9 in an 8-player room");
        assert_eq!(err, DomainError::SeatNotFound(9));
    }

    #[test]
    fn short_allocation_is_rejected_without_partial_state() {
        let mut room = room_of(9);
        let neutral = neutral_seat(&room);
        let seats = clan_seats(&room);

        // {real: 1, fake: 1} against an expected {real: 1, fake: 2}
        let mut allocation = BTreeMap::new();
        allocation.insert(seats[0], Some(SecretCard::Real));
        allocation.insert(seats[1], Some(SecretCard::Fake));

        let err = room
            .distribute_secret_cards(neutral, &allocation, Utc::now())
            .expect_err("tally mismatch");
        assert!(matches!(err, DomainError::AllocationCountMismatch { .. }));
        assert!(room.identities.iter().all(|i| i.has_secret_card.is_none()));
        assert!(!room
            .identity(neutral)
            .expect("neutral")
            .secret_cards_committed);
    }

    #[test]
    fn exact_allocation_commits_once_then_rejects_repeats() {
        let mut room = room_of(9);
        let neutral = neutral_seat(&room);
        let seats = clan_seats(&room);

        let mut allocation = BTreeMap::new();
        allocation.insert(seats[0], Some(SecretCard::Real));
        allocation.insert(seats[1], Some(SecretCard::Fake));
        allocation.insert(seats[2], Some(SecretCard::Fake));
        allocation.insert(seats[3], None);

        room.distribute_secret_cards(neutral, &allocation, Utc::now())
            .expect("valid allocation");
        assert_eq!(
            room.identity(seats[0]).expect("seat").has_secret_card,
            Some(SecretCard::Real)
        );
        assert_eq!(
            room.identity(seats[3]).expect("seat").has_secret_card,
            None
        );
        assert!(room
            .identity(neutral)
            .expect("neutral")
            .secret_cards_committed);

        let err = room
            .distribute_secret_cards(neutral, &allocation, Utc::now())
            .expect_err("second distribution");
        assert_eq!(err, DomainError::AlreadyDistributed);
        // Prior assignments untouched
        assert_eq!(
            room.identity(seats[0]).expect("seat").has_secret_card,
            Some(SecretCard::Real)
        );
    }

    #[test]
    fn allocation_naming_an_unknown_seat_is_rejected_without_partial_state() {
        let mut room = room_of(9);
        let neutral = neutral_seat(&room);
        let seats = clan_seats(&room);

        // Tally matches the 9-player table (1 real, 2 fake), but one
        // target seat does not exist.
        let mut allocation = BTreeMap::new();
        allocation.insert(seats[0], Some(SecretCard::Real));
        allocation.insert(seats[1], Some(SecretCard::Fake));
        allocation.insert(SeatId::new(99), Some(SecretCard::Fake));

        let err = room
            .distribute_secret_cards(neutral, &allocation, Utc::now())
            .expect_err("unknown target seat");
        assert_eq!(err, DomainError::SeatNotFound(99));
        assert!(room.identities.iter().all(|i| i.has_secret_card.is_none()));
        assert!(!room
            .identity(neutral)
            .expect("neutral")
            .secret_cards_committed);

        // A corrected retry commits cleanly on untouched state.
        let mut retry = BTreeMap::new();
        retry.insert(seats[0], Some(SecretCard::Real));
        retry.insert(seats[1], Some(SecretCard::Fake));
        retry.insert(seats[2], Some(SecretCard::Fake));
        room.distribute_secret_cards(neutral, &retry, Utc::now())
            .expect("valid retry");
        assert_eq!(
            room.identities
                .iter()
                .filter(|i| i.has_secret_card.is_some())
                .count(),
            3
        );
    }

    #[test]
    fn non_neutral_seat_cannot_distribute() {
        let mut room = room_of(7);
        let seat = clan_seats(&room)[0];
        let err = room
            .distribute_secret_cards(seat, &BTreeMap::new(), Utc::now())
            .expect_err("clan seat acting");
        assert_eq!(err, DomainError::NotNeutralSeat(seat.value()));
    }

    #[test]
    fn restart_preserves_display_names_by_seat() {
        let mut room = room_of(8);
        let now = Utc::now();
        room.set_display_name(SeatId::new(3), "Alice".into(), now)
            .expect("seat 3");
        let old_rank = room.identity(SeatId::new(3)).expect("seat").role_rank;
        let old_faction = room.identity(SeatId::new(3)).expect("seat").faction;

        // Drive the RNG until seat 3 draws a different identity, to
        // show the name survives an actual redraw.
        let mut rng = StdRng::seed_from_u64(99);
        let mut redrawn = false;
        for _ in 0..20 {
            room.restart(&mut rng, now).expect("restart");
            let seat = room.identity(SeatId::new(3)).expect("seat");
            assert_eq!(seat.display_name.as_deref(), Some("Alice"));
            if seat.role_rank != old_rank || seat.faction != old_faction {
                redrawn = true;
                break;
            }
        }
        assert!(redrawn, "seat 3 never changed identity across 20 restarts");
        assert_eq!(room.phase, Phase::Playing);
    }

    #[test]
    fn restart_resets_commitment_flags() {
        let mut room = room_of(7);
        let neutral = neutral_seat(&room);
        let seats = clan_seats(&room);
        let mut allocation = BTreeMap::new();
        allocation.insert(seats[0], Some(SecretCard::Real));
        allocation.insert(seats[1], Some(SecretCard::Fake));
        room.distribute_secret_cards(neutral, &allocation, Utc::now())
            .expect("valid allocation");

        let mut rng = StdRng::seed_from_u64(3);
        room.restart(&mut rng, Utc::now()).expect("restart");
        assert!(room
            .identities
            .iter()
            .all(|i| !i.secret_cards_committed && i.has_secret_card.is_none()));
    }

    #[test]
    fn expiry_window_is_exclusive_of_the_boundary() {
        let mut room = room_of(6);
        let now = Utc::now();
        room.touch(now);
        let window = Duration::minutes(30);
        assert!(!room.is_expired(now + Duration::minutes(30), window));
        assert!(room.is_expired(now + Duration::minutes(31), window));
    }

    #[test]
    fn presence_toggles_connected_seats_and_identity() {
        let mut room = room_of(8);
        let now = Utc::now();
        room.set_presence(SeatId::new(4), true, now).expect("seat");
        assert_eq!(room.connected_seat_ids(), vec![SeatId::new(4)]);
        assert!(room.identity(SeatId::new(4)).expect("seat").is_online);

        room.set_presence(SeatId::new(4), false, now).expect("seat");
        assert!(room.connected_seat_ids().is_empty());
        let identity = room.identity(SeatId::new(4)).expect("seat");
        assert!(!identity.is_online);
        assert!(identity.last_seen_at.is_some());
    }

    #[test]
    fn even_sizes_have_no_allocation_budget() {
        assert_eq!(expected_allocation(7), (1, 1));
        assert_eq!(expected_allocation(9), (1, 2));
        assert_eq!(expected_allocation(11), (1, 3));
        assert_eq!(expected_allocation(8), (0, 0));
        assert_eq!(expected_allocation(12), (0, 0));
    }

    #[test]
    fn replace_identities_is_last_writer_wins() {
        let mut room = room_of(6);
        let mut replacement = room.identities.clone();
        replacement[0].revealed_faction = true;
        replacement[0].faction = Faction::Gargoyle;
        room.replace_identities(replacement.clone(), Utc::now());
        assert_eq!(room.identities, replacement);
    }
}
