//! Randomized identity assignment.
//!
//! Pure given the injected RNG: player count in, a balanced set of
//! secret identities out. The RNG comes in from the caller so the
//! engine can use ambient randomness while tests stay seedable.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::DomainError;
use crate::identity::{DisplayedColor, Faction, PlayerIdentity};
use crate::ids::{AccessToken, SeatId};
use crate::room::{MAX_PLAYERS, MIN_PLAYERS};

/// Rank reserved for the neutral inquisitor.
pub const NEUTRAL_RANK: u8 = 10;

/// Highest rank available to clan roles.
const MAX_CLAN_RANK: u8 = 9;

/// Assign secret identities for a session of `count` players.
///
/// Odd counts get exactly one neutral seat; the remaining clan seats
/// split between Phoenix and Gargoyle to within one. Ranks are unique
/// per faction while the pool allows it (more than 9 clan seats pad
/// the pool with duplicate draws, legal because the two clans are
/// disjoint rank spaces).
pub fn assign_identities(
    count: u8,
    rng: &mut impl Rng,
) -> Result<Vec<PlayerIdentity>, DomainError> {
    if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&count) {
        return Err(DomainError::InvalidPlayerCount(count));
    }

    let use_neutral = count % 2 == 1;
    let regular = if use_neutral { count - 1 } else { count };

    // Rank pool for the clan seats.
    let mut ranks: Vec<u8> = if regular <= MAX_CLAN_RANK {
        (1..=regular).collect()
    } else {
        let mut pool: Vec<u8> = (1..=MAX_CLAN_RANK).collect();
        for _ in 0..(regular - MAX_CLAN_RANK) {
            pool.push(rng.gen_range(1..=MAX_CLAN_RANK));
        }
        pool
    };
    ranks.shuffle(rng);

    // Faction list, balanced to within one seat.
    let phoenix_count = regular / 2;
    let mut factions: Vec<Faction> = Vec::with_capacity(regular as usize);
    factions.extend(std::iter::repeat(Faction::Phoenix).take(phoenix_count as usize));
    factions.extend(
        std::iter::repeat(Faction::Gargoyle).take((regular - phoenix_count) as usize),
    );
    factions.shuffle(rng);

    let mut assignments: Vec<(u8, Faction, Option<DisplayedColor>)> = ranks
        .into_iter()
        .zip(factions)
        .map(|(rank, faction)| (rank, faction, None))
        .collect();

    if use_neutral {
        let color = if rng.gen_bool(0.5) {
            DisplayedColor::Red
        } else {
            DisplayedColor::Blue
        };
        assignments.push((NEUTRAL_RANK, Faction::Neutral, Some(color)));
    }

    // Final shuffle decides the seat order.
    assignments.shuffle(rng);

    Ok(assignments
        .into_iter()
        .enumerate()
        .map(|(index, (rank, faction, displayed))| PlayerIdentity {
            seat_id: SeatId::new(index as u8 + 1),
            role_rank: rank,
            faction,
            revealed_faction: false,
            revealed_rank: false,
            reveals: Vec::new(),
            access_token: AccessToken::generate(rng),
            display_name: None,
            is_online: false,
            last_seen_at: None,
            has_secret_card: None,
            secret_cards_committed: false,
            displayed_faction_to_next: displayed,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn seeded() -> StdRng {
        StdRng::seed_from_u64(0xb100d)
    }

    #[test]
    fn rejects_counts_outside_supported_range() {
        let mut rng = seeded();
        assert_eq!(
            assign_identities(5, &mut rng),
            Err(DomainError::InvalidPlayerCount(5))
        );
        assert_eq!(
            assign_identities(13, &mut rng),
            Err(DomainError::InvalidPlayerCount(13))
        );
    }

    #[test]
    fn every_count_yields_count_identities_with_sequential_seats() {
        let mut rng = seeded();
        for count in 6..=12u8 {
            let ids = assign_identities(count, &mut rng).expect("assign");
            assert_eq!(ids.len(), count as usize);
            for (i, id) in ids.iter().enumerate() {
                assert_eq!(id.seat_id.value(), i as u8 + 1);
            }
        }
    }

    #[test]
    fn exactly_one_neutral_iff_count_is_odd() {
        let mut rng = seeded();
        for count in 6..=12u8 {
            let ids = assign_identities(count, &mut rng).expect("assign");
            let neutrals: Vec<_> = ids.iter().filter(|i| i.is_neutral()).collect();
            if count % 2 == 1 {
                assert_eq!(neutrals.len(), 1, "count {count}");
                assert_eq!(neutrals[0].role_rank, NEUTRAL_RANK);
                assert!(neutrals[0].displayed_faction_to_next.is_some());
            } else {
                assert!(neutrals.is_empty(), "count {count}");
            }
        }
    }

    #[test]
    fn clan_sizes_are_balanced_to_within_one() {
        let mut rng = seeded();
        for count in 6..=12u8 {
            let ids = assign_identities(count, &mut rng).expect("assign");
            let phoenix = ids.iter().filter(|i| i.faction == Faction::Phoenix).count();
            let gargoyle = ids
                .iter()
                .filter(|i| i.faction == Faction::Gargoyle)
                .count();
            let regular = count as usize - usize::from(count % 2 == 1);
            assert_eq!(phoenix + gargoyle, regular, "count {count}");
            assert!(phoenix.abs_diff(gargoyle) <= 1, "count {count}");
        }
    }

    #[test]
    fn clan_ranks_are_unique_while_the_pool_allows() {
        let mut rng = seeded();
        for count in 6..=11u8 {
            let regular = count - (count % 2);
            if regular > 9 {
                continue;
            }
            let ids = assign_identities(count, &mut rng).expect("assign");
            let ranks: HashSet<u8> = ids
                .iter()
                .filter(|i| !i.is_neutral())
                .map(|i| i.role_rank)
                .collect();
            assert_eq!(ranks.len(), regular as usize, "count {count}");
        }
    }

    #[test]
    fn oversized_tables_pad_with_valid_duplicate_ranks() {
        let mut rng = seeded();
        for count in [11u8, 12] {
            let ids = assign_identities(count, &mut rng).expect("assign");
            for id in ids.iter().filter(|i| !i.is_neutral()) {
                assert!((1..=9).contains(&id.role_rank));
                assert_ne!(id.faction, Faction::Neutral);
            }
        }
    }

    #[test]
    fn assign_eight_gives_four_four_split_without_neutral() {
        let mut rng = seeded();
        let ids = assign_identities(8, &mut rng).expect("assign");
        assert_eq!(ids.len(), 8);
        assert_eq!(
            ids.iter().filter(|i| i.faction == Faction::Phoenix).count(),
            4
        );
        assert_eq!(
            ids.iter().filter(|i| i.faction == Faction::Gargoyle).count(),
            4
        );
        assert!(ids.iter().all(|i| !i.is_neutral()));
    }

    #[test]
    fn assign_seven_gives_three_three_plus_neutral() {
        let mut rng = seeded();
        let ids = assign_identities(7, &mut rng).expect("assign");
        assert_eq!(
            ids.iter().filter(|i| i.faction == Faction::Phoenix).count(),
            3
        );
        assert_eq!(
            ids.iter().filter(|i| i.faction == Faction::Gargoyle).count(),
            3
        );
        let neutral = ids.iter().find(|i| i.is_neutral()).expect("neutral seat");
        assert!(matches!(
            neutral.displayed_faction_to_next,
            Some(DisplayedColor::Red) | Some(DisplayedColor::Blue)
        ));
    }

    #[test]
    fn every_identity_gets_a_fresh_access_token() {
        let mut rng = seeded();
        let ids = assign_identities(12, &mut rng).expect("assign");
        let tokens: HashSet<&str> = ids.iter().map(|i| i.access_token.as_str()).collect();
        assert_eq!(tokens.len(), 12);
    }
}
