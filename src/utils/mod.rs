pub mod normalize;

pub use normalize::{
    find_league, find_player, find_team, league_entries, normalize_date, normalize_h2h,
    normalize_league, normalize_player, normalize_team, normalize_token, player_entries,
    strip_accents, team_entries,
};
