//! SQL text of the transforms.
//!
//! Event columns keep their camelCase source names and must be quoted;
//! unquoted identifiers are lower-cased by the engine.

use crate::config::JoinStrategy;

/// View holding the catalog records read by the catalog stage.
pub const CATALOG_VIEW: &str = "catalog";
/// View holding every event record.
pub const RAW_EVENTS_VIEW: &str = "raw_events";
/// View holding only playback events.
pub const PLAYED_EVENTS_VIEW: &str = "played_events";
/// View holding the catalog re-read by the event stage for the fact join.
pub const CATALOG_LOOKUP_VIEW: &str = "catalog_lookup";
/// View over the fact query, used to measure the join match rate.
pub const ACTIVITY_FACTS_VIEW: &str = "activity_facts";

/// Event subtype of a completed playback.
pub const PLAYBACK_PAGE: &str = "NextSong";

pub fn items_query() -> String {
    format!(
        r#"SELECT DISTINCT song_id AS item_id,
       title,
       artist_id AS parent_id,
       "year",
       duration
FROM "{CATALOG_VIEW}""#
    )
}

pub fn creators_query() -> String {
    format!(
        r#"SELECT DISTINCT artist_id AS parent_id,
       artist_name AS name,
       artist_location AS location,
       artist_latitude AS latitude,
       artist_longitude AS longitude
FROM "{CATALOG_VIEW}""#
    )
}

pub fn played_events_query() -> String {
    format!(r#"SELECT * FROM {RAW_EVENTS_VIEW} WHERE page = '{PLAYBACK_PAGE}'"#)
}

pub fn users_query() -> String {
    format!(
        r#"SELECT DISTINCT "userId" AS user_id,
       "firstName" AS first_name,
       "lastName" AS last_name,
       gender,
       level
FROM {PLAYED_EVENTS_VIEW}"#
    )
}

/// Millisecond `ts` to a timestamp. The double cast accepts numeric and
/// textual `ts`.
fn start_time_expr() -> &'static str {
    "to_timestamp_millis(CAST(CAST(ts AS DOUBLE) AS BIGINT))"
}

/// Integer calendar field of `start_time`.
fn calendar(part: &str, column: &str) -> String {
    format!("CAST(date_part('{part}', {column}) AS INT)")
}

pub fn time_query() -> String {
    format!(
        r#"SELECT DISTINCT start_time,
       {hour} AS "hour",
       {day} AS "day",
       {week} AS "week",
       {month} AS "month",
       {year} AS "year",
       CAST((date_part('dow', start_time) + 6) % 7 AS INT) AS weekday
FROM (SELECT {start_time} AS start_time FROM {PLAYED_EVENTS_VIEW}) AS t"#,
        hour = calendar("hour", "start_time"),
        day = calendar("day", "start_time"),
        week = calendar("week", "start_time"),
        month = calendar("month", "start_time"),
        year = calendar("year", "start_time"),
        start_time = start_time_expr(),
    )
}

/// Join condition between events `e` and catalog `c`.
pub fn join_condition(strategy: JoinStrategy, event_item_column: Option<&str>) -> String {
    match strategy {
        JoinStrategy::Exact => "e.artist = c.artist_name AND e.song = c.title".to_string(),
        JoinStrategy::Normalized => "lower(trim(e.artist)) = lower(trim(c.artist_name)) \
             AND lower(trim(e.song)) = lower(trim(c.title))"
            .to_string(),
        JoinStrategy::ItemId => {
            let column = event_item_column.unwrap_or("song_id").replace('"', "\"\"");
            format!(r#"e."{column}" = c.song_id"#)
        }
    }
}

/// Fact query. The lookup side is de-duplicated so a catalog record stored
/// twice cannot multiply event rows.
pub fn activity_facts_query(join_condition: &str) -> String {
    format!(
        r#"SELECT e.start_time,
       {month} AS "month",
       {year} AS "year",
       e."userId" AS user_id,
       e.level,
       c.song_id AS item_id,
       c.artist_id AS parent_id,
       e."sessionId" AS session_id,
       e.location,
       e."userAgent" AS user_agent
FROM (SELECT *, {start_time} AS start_time FROM {PLAYED_EVENTS_VIEW}) AS e
LEFT JOIN (SELECT DISTINCT * FROM {CATALOG_LOOKUP_VIEW}) AS c
  ON {join_condition}
WHERE e.page = '{PLAYBACK_PAGE}'"#,
        month = calendar("month", "e.start_time"),
        year = calendar("year", "e.start_time"),
        start_time = start_time_expr(),
    )
}

pub fn match_rate_query() -> String {
    format!("SELECT COUNT(*) AS total, COUNT(item_id) AS matched FROM {ACTIVITY_FACTS_VIEW}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_join_compares_raw_strings() {
        assert_eq!(
            join_condition(JoinStrategy::Exact, None),
            "e.artist = c.artist_name AND e.song = c.title"
        );
    }

    #[test]
    fn test_normalized_join_trims_and_lowercases() {
        let condition = join_condition(JoinStrategy::Normalized, None);
        assert!(condition.contains("lower(trim(e.artist)) = lower(trim(c.artist_name))"));
        assert!(condition.contains("lower(trim(e.song)) = lower(trim(c.title))"));
    }

    #[test]
    fn test_item_id_join_quotes_column() {
        assert_eq!(
            join_condition(JoinStrategy::ItemId, Some("songId")),
            r#"e."songId" = c.song_id"#
        );
    }

    #[test]
    fn test_fact_query_filters_playback_and_left_joins() {
        let query = activity_facts_query("e.artist = c.artist_name");
        assert!(query.contains("LEFT JOIN (SELECT DISTINCT * FROM catalog_lookup) AS c"));
        assert!(query.contains("WHERE e.page = 'NextSong'"));
        assert!(query.contains("FROM played_events"));
    }
}
