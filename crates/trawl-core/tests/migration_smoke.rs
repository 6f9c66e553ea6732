//! Structural validation of the embedded migration, independent of a
//! live database connection.

const MIGRATION_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/migrations/0001_init.sql");

fn read_migration() -> String {
    std::fs::read_to_string(MIGRATION_PATH).expect("migration file should exist")
}

#[test]
fn migration_file_exists_and_is_nonempty() {
    let sql = read_migration();
    assert!(!sql.trim().is_empty());
}

#[test]
fn contains_posts_table() {
    assert!(read_migration().contains("CREATE TABLE posts"));
}

#[test]
fn contains_links_table_with_unique_normalized_url() {
    let sql = read_migration();
    assert!(sql.contains("CREATE TABLE links"));
    assert!(sql.contains("normalized_url") && sql.contains("UNIQUE"));
}

#[test]
fn contains_post_links_composite_key_with_cascade() {
    let sql = read_migration();
    assert!(sql.contains("CREATE TABLE post_links"));
    assert!(sql.contains("ON DELETE CASCADE"));
}

#[test]
fn contains_network_accounts_with_backfill_flag() {
    let sql = read_migration();
    assert!(sql.contains("CREATE TABLE network_accounts"));
    assert!(sql.contains("backfill_completed"));
}

#[test]
fn contains_jetstream_state_singleton() {
    assert!(read_migration().contains("CREATE TABLE jetstream_state"));
}

#[test]
fn contains_required_indexes() {
    let sql = read_migration();
    for expected in [
        "posts_created_at_idx",
        "posts_author_did_idx",
        "posts_author_degree_idx",
        "post_links_link_id_idx",
        "post_links_post_id_idx",
    ] {
        assert!(sql.contains(expected), "missing index {expected}");
    }
}
