//! Ratings and random selection
//!
//! Ratings are keyed by content hash, so they follow identical bytes across
//! paths and survive re-ingestion. Random selection keeps no server-side
//! state: the caller sends back the ignore list it was given.

use rand::Rng;
use serde::Serialize;
use std::collections::HashSet;

use crate::error::{QueryError, QueryResult};
use crate::join::rated_entries;
use crate::query::{effective_limit, Library, SongView, User};

/// Accepted rating range
pub const MIN_RATING: i64 = 1;
pub const MAX_RATING: i64 = 10;

/// Default share of the eligible set the ignore list may cover
pub const DEFAULT_IGNORE_FRACTION: f64 = 0.5;

fn valid_rating(rating: i64) -> bool {
    (MIN_RATING..=MAX_RATING).contains(&rating)
}

/// Result of a rating write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateOutcome {
    /// Content hash the rating was stored under
    pub hash: String,
    /// True when a new overlay row was created
    pub inserted: bool,
}

/// Rating of one song for the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RatedSong {
    /// Path below the vpath
    pub song: String,
    pub rating: u8,
}

/// Random selection input
#[derive(Debug, Clone, Default)]
pub struct RandomRequest {
    /// Indices served recently, oldest first
    pub ignore_list: Vec<usize>,
    /// Share of the eligible set the ignore list may cover, in (0, 1)
    pub ignore_fraction: Option<f64>,
    /// Vpaths excluded from this draw
    pub ignore_vpaths: Vec<String>,
    pub min_rating: Option<i64>,
    pub max_rating: Option<i64>,
}

impl RandomRequest {
    fn fraction(&self) -> f64 {
        match self.ignore_fraction {
            Some(f) if f > 0.0 && f < 1.0 => f,
            _ => DEFAULT_IGNORE_FRACTION,
        }
    }

    /// Inclusive rating bounds, only when both are present and in range
    fn rating_range(&self) -> Option<(u8, u8)> {
        match (self.min_rating, self.max_rating) {
            (Some(min), Some(max)) if valid_rating(min) && valid_rating(max) => {
                Some((min as u8, max as u8))
            }
            _ => None,
        }
    }
}

/// Random selection output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RandomPick {
    pub song: SongView,
    /// Trimmed ignore list with the drawn index appended
    #[serde(rename = "ignoreList")]
    pub ignore_list: Vec<usize>,
}

/// Draw an index in `0..count` that is not in the trimmed ignore list
///
/// The list is first trimmed from the front until it holds at most
/// `count * fraction` entries, which leaves at least one free index. The drawn
/// index is appended to the list.
pub fn pick_index<R: Rng>(count: usize, ignore_list: &mut Vec<usize>, fraction: f64, rng: &mut R) -> usize {
    let bound = count as f64 * fraction;
    let mut excess = 0;
    while (ignore_list.len() - excess) as f64 > bound {
        excess += 1;
    }
    ignore_list.drain(..excess);

    let ignored: HashSet<usize> = ignore_list.iter().copied().collect();
    let mut index = rng.gen_range(0..count);
    while ignored.contains(&index) {
        index = rng.gen_range(0..count);
    }
    ignore_list.push(index);
    index
}

impl Library {
    /// Set the caller's rating of one `vpath/path`
    pub fn rate_song(&mut self, user: &User, filepath: &str, rating: i64) -> QueryResult<RateOutcome> {
        if filepath.is_empty() || !valid_rating(rating) {
            return Err(QueryError::BadInput(format!("{} {}", filepath, rating)));
        }
        let info = user.resolve(filepath)?;
        self.overlay()?;
        let entry = self
            .catalog()?
            .find_entry(&info.vpath, &info.relative_path)?
            .ok_or_else(|| QueryError::FileNotFound(filepath.to_string()))?;

        let inserted = self
            .overlay_mut()?
            .upsert_rating(&entry.hash, &user.username, rating as u8)?;
        log::info!(
            "{} rating for {} ({})",
            if inserted { "Inserted" } else { "Updated" },
            filepath,
            entry.hash
        );
        Ok(RateOutcome {
            hash: entry.hash,
            inserted,
        })
    }

    /// Remove the caller's rating of one `vpath/path`
    pub fn unrate_song(&mut self, user: &User, filepath: &str) -> QueryResult<bool> {
        if filepath.is_empty() {
            return Err(QueryError::BadInput("missing filepath".to_string()));
        }
        let info = user.resolve(filepath)?;
        let entry = self
            .catalog()?
            .find_entry(&info.vpath, &info.relative_path)?
            .ok_or_else(|| QueryError::FileNotFound(filepath.to_string()))?;

        log::info!("Removing rating for {}", entry.hash);
        Ok(self.overlay_mut()?.remove_rating(&entry.hash, &user.username)?)
    }

    /// Remove every rating of the caller
    pub fn clear_ratings(&mut self, user: &User) -> QueryResult<u64> {
        Ok(self.overlay_mut()?.clear_ratings(&user.username)?)
    }

    /// The caller's rating of one `vpath/path`
    pub fn rated_song(&self, user: &User, filepath: &str) -> QueryResult<RatedSong> {
        let info = user.resolve(filepath)?;
        let overlay = self.overlay()?;
        let entry = self
            .catalog()?
            .find_entry(&info.vpath, &info.relative_path)?
            .ok_or_else(|| QueryError::FileNotFound(filepath.to_string()))?;

        let row = overlay
            .find_rating(&entry.hash, &user.username)?
            .ok_or(QueryError::NoMatch)?;
        Ok(RatedSong {
            song: info.relative_path,
            rating: row.rating,
        })
    }

    /// Number of songs the caller has rated
    pub fn rated_count(&self, user: &User) -> QueryResult<u64> {
        Ok(self.overlay()?.rating_count(&user.username)?)
    }

    /// Rated songs in the caller's vpaths, highest rating first
    pub fn all_rated(&self, user: &User, limit: Option<i64>) -> QueryResult<Vec<SongView>> {
        let entries = self.accessible_entries(&user.vpaths)?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        let ratings = self.overlay()?.ratings_for_user(&user.username)?;

        let mut rated: Vec<_> = rated_entries(&ratings, &entries, &user.username)
            .into_iter()
            .filter(|r| r.rating.unwrap_or(0) > 0)
            .collect();
        rated.sort_by(|a, b| b.rating.cmp(&a.rating));
        rated.truncate(effective_limit(limit));
        Ok(rated.iter().map(SongView::from).collect())
    }

    /// Pick a random song, avoiding recently served indices
    pub fn random_song(&self, user: &User, request: RandomRequest) -> QueryResult<RandomPick> {
        self.random_song_with(user, request, &mut rand::thread_rng())
    }

    /// [`Library::random_song`] with a caller-supplied generator
    pub fn random_song_with<R: Rng>(
        &self,
        user: &User,
        request: RandomRequest,
        rng: &mut R,
    ) -> QueryResult<RandomPick> {
        self.catalog()?;
        let vpaths: Vec<String> = user
            .vpaths
            .iter()
            .filter(|v| !request.ignore_vpaths.contains(v))
            .cloned()
            .collect();
        let entries = self.accessible_entries(&vpaths)?;
        let mut eligible = self.attach_ratings(user, &entries)?;

        if let Some((min, max)) = request.rating_range() {
            eligible.retain(|r| r.rating.is_some_and(|rating| rating >= min && rating <= max));
        }
        if eligible.is_empty() {
            return Err(QueryError::NoMatch);
        }

        let fraction = request.fraction();
        let mut ignore_list = request.ignore_list;
        let index = pick_index(eligible.len(), &mut ignore_list, fraction, rng);
        Ok(RandomPick {
            song: SongView::from(&eligible[index]),
            ignore_list,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::sample_entry;
    use crate::db::{CatalogStore, SqliteCatalog};
    use crate::overlay::OverlayStore;
    use crate::query::tests::{alice, library};
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn bob() -> User {
        User::new("bob", vec!["music".to_string()])
    }

    #[test]
    fn test_rating_round_trip() {
        let mut lib = library();
        let outcome = lib.rate_song(&alice(), "music/abba/sos.flac", 7).unwrap();
        assert!(outcome.inserted);
        assert_eq!(outcome.hash, "h3");

        let rated = lib.rated_song(&alice(), "music/abba/sos.flac").unwrap();
        assert_eq!(rated.song, "abba/sos.flac");
        assert_eq!(rated.rating, 7);

        assert!(!lib.rate_song(&alice(), "music/abba/sos.flac", 3).unwrap().inserted);
        assert_eq!(lib.rated_song(&alice(), "music/abba/sos.flac").unwrap().rating, 3);
    }

    #[test]
    fn test_rating_out_of_range_rejected() {
        let mut lib = library();
        for rating in [0, 11, -1] {
            assert!(matches!(
                lib.rate_song(&alice(), "music/abba/sos.flac", rating),
                Err(QueryError::BadInput(_))
            ));
        }
        assert!(matches!(lib.rate_song(&alice(), "", 5), Err(QueryError::BadInput(_))));
        assert_eq!(lib.rated_count(&alice()).unwrap(), 0);
    }

    #[test]
    fn test_rating_requires_catalogued_accessible_file() {
        let mut lib = library();
        assert!(matches!(
            lib.rate_song(&alice(), "music/missing.mp3", 5),
            Err(QueryError::FileNotFound(_))
        ));
        assert!(matches!(
            lib.rate_song(&alice(), "private/secret.mp3", 5),
            Err(QueryError::FileNotFound(_))
        ));
        // exact match only: a prefix of a real path is not a hit
        assert!(matches!(
            lib.rate_song(&alice(), "music/abba/sos", 5),
            Err(QueryError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_rating_without_stores() {
        let mut lib = Library::new(None, Some(OverlayStore::open_memory().unwrap()));
        assert!(matches!(
            lib.rate_song(&alice(), "music/a.mp3", 5),
            Err(QueryError::NotInitialized("catalog"))
        ));
        let lib = Library::new(None, None);
        assert!(matches!(lib.rated_count(&alice()), Err(QueryError::NotInitialized("overlay"))));
    }

    #[test]
    fn test_rated_song_not_rated() {
        let lib = library();
        assert!(matches!(
            lib.rated_song(&alice(), "music/abba/sos.flac"),
            Err(QueryError::NoMatch)
        ));
    }

    #[test]
    fn test_unrate_and_clear_are_per_user() {
        let mut lib = library();
        lib.rate_song(&alice(), "music/abba/sos.flac", 7).unwrap();
        lib.rate_song(&alice(), "music/beatles/help.mp3", 8).unwrap();
        lib.rate_song(&bob(), "music/abba/sos.flac", 2).unwrap();

        assert!(lib.unrate_song(&alice(), "music/abba/sos.flac").unwrap());
        assert!(!lib.unrate_song(&alice(), "music/abba/sos.flac").unwrap());
        assert_eq!(lib.rated_count(&alice()).unwrap(), 1);

        assert_eq!(lib.clear_ratings(&alice()).unwrap(), 1);
        assert_eq!(lib.rated_count(&alice()).unwrap(), 0);
        assert_eq!(lib.rated_count(&bob()).unwrap(), 1);
    }

    #[test]
    fn test_rating_follows_content_hash() {
        let mut catalog = SqliteCatalog::open_memory().unwrap();
        catalog.insert(&[sample_entry("", "a.mp3", "same")], "music").unwrap();
        catalog.insert(&[sample_entry("", "copy/a.mp3", "same")], "podcasts").unwrap();
        let mut lib = Library::new(Some(catalog), Some(OverlayStore::open_memory().unwrap()));

        lib.rate_song(&alice(), "music/a.mp3", 6).unwrap();
        assert_eq!(lib.rated_song(&alice(), "podcasts/copy/a.mp3").unwrap().rating, 6);
    }

    #[test]
    fn test_all_rated_sorted_desc() {
        let mut lib = library();
        lib.rate_song(&alice(), "music/abba/sos.flac", 4).unwrap();
        lib.rate_song(&alice(), "music/beatles/help.mp3", 9).unwrap();
        lib.rate_song(&alice(), "podcasts/ep1.mp3", 6).unwrap();
        lib.rate_song(&bob(), "music/abba/waterloo.flac", 10).unwrap();

        let rated = lib.all_rated(&alice(), None).unwrap();
        let ratings: Vec<_> = rated.iter().map(|s| s.metadata.rating.unwrap()).collect();
        assert_eq!(ratings, vec![9, 6, 4]);
        assert_eq!(rated[0].filepath, "music/beatles/help.mp3");

        assert_eq!(lib.all_rated(&alice(), Some(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_request_defaults() {
        let request = RandomRequest {
            ignore_fraction: Some(1.5),
            min_rating: Some(3),
            ..Default::default()
        };
        assert_eq!(request.fraction(), DEFAULT_IGNORE_FRACTION);
        assert_eq!(request.rating_range(), None);

        let request = RandomRequest {
            ignore_fraction: Some(0.25),
            min_rating: Some(3),
            max_rating: Some(8),
            ..Default::default()
        };
        assert_eq!(request.fraction(), 0.25);
        assert_eq!(request.rating_range(), Some((3, 8)));

        let request = RandomRequest {
            min_rating: Some(0),
            max_rating: Some(8),
            ..Default::default()
        };
        assert_eq!(request.rating_range(), None);
    }

    #[test]
    fn test_pick_index_trims_oldest() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut ignore = vec![0, 1, 2, 3];
        let index = pick_index(4, &mut ignore, 0.5, &mut rng);

        assert_eq!(&ignore[..2], &[2, 3]);
        assert_eq!(ignore.len(), 3);
        assert!(index == 0 || index == 1);
    }

    #[test]
    fn test_random_song_empty_set_is_no_match() {
        let lib = library();
        let request = RandomRequest {
            ignore_vpaths: vec!["music".to_string(), "podcasts".to_string()],
            ..Default::default()
        };
        assert!(matches!(lib.random_song(&alice(), request), Err(QueryError::NoMatch)));

        let lib = Library::new(None, None);
        assert!(matches!(
            lib.random_song(&alice(), RandomRequest::default()),
            Err(QueryError::NotInitialized("catalog"))
        ));
    }

    #[test]
    fn test_random_song_respects_ignored_vpaths() {
        let lib = library();
        let mut rng = StdRng::seed_from_u64(42);
        let request = RandomRequest {
            ignore_vpaths: vec!["music".to_string()],
            ..Default::default()
        };
        let pick = lib.random_song_with(&alice(), request, &mut rng).unwrap();
        assert_eq!(pick.song.filepath, "podcasts/ep1.mp3");
        assert_eq!(pick.ignore_list, vec![0]);
    }

    #[test]
    fn test_random_song_rating_range() {
        let mut lib = library();
        lib.rate_song(&alice(), "music/abba/sos.flac", 4).unwrap();
        lib.rate_song(&alice(), "music/beatles/help.mp3", 9).unwrap();

        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..10 {
            let request = RandomRequest {
                min_rating: Some(8),
                max_rating: Some(10),
                ..Default::default()
            };
            let pick = lib.random_song_with(&alice(), request, &mut rng).unwrap();
            assert_eq!(pick.song.filepath, "music/beatles/help.mp3");
            assert_eq!(pick.song.metadata.rating, Some(9));
        }
    }

    #[test]
    fn test_random_song_cycles_without_repeats() {
        let lib = library();
        let mut rng = StdRng::seed_from_u64(3);
        let mut ignore_list = Vec::new();
        let mut served = Vec::new();
        for _ in 0..2 {
            let request = RandomRequest {
                ignore_list: ignore_list.clone(),
                ..Default::default()
            };
            let pick = lib.random_song_with(&alice(), request, &mut rng).unwrap();
            served.push(pick.song.filepath);
            ignore_list = pick.ignore_list;
        }
        assert_eq!(ignore_list.len(), 2);
        assert_ne!(served[0], served[1]);
    }

    proptest! {
        #[test]
        fn prop_pick_never_repeats_ignored(
            count in 1usize..40,
            ignore in prop::collection::vec(0usize..50, 0..60),
            fraction in 0.05f64..0.95,
            seed in any::<u64>(),
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut list = ignore.clone();
            let index = pick_index(count, &mut list, fraction, &mut rng);

            prop_assert!(index < count);
            prop_assert_eq!(list.last().copied(), Some(index));
            let trimmed = &list[..list.len() - 1];
            prop_assert!(!trimmed.contains(&index));
            prop_assert!(trimmed.len() as f64 <= count as f64 * fraction);
            prop_assert!(ignore.ends_with(trimmed));
        }
    }
}
