use msrcli::cli::filter_albums;
use msrcli::types::{Album, AlbumTableRow};
use msrcli::utils::*;
use std::time::Duration;

// Helper function to create a test album
fn create_test_album(cid: &str, name: &str) -> Album {
    Album {
        cid: cid.to_string(),
        name: name.to_string(),
        cover_url: format!("https://example.com/{}.jpg", cid),
        artistes: vec!["塞壬唱片-MSR".to_string()],
    }
}

fn catalog() -> Vec<Album> {
    vec![
        create_test_album("0001", "Sanctuary Inside"),
        create_test_album("0002", "Sanctuary"),
        create_test_album("0003", "Operation Blade"),
        create_test_album("0004", "Operation Pyrite"),
        create_test_album("0005", "Dream of Nothing"),
    ]
}

#[test]
fn test_make_valid_replaces_unsafe_characters() {
    assert_eq!(make_valid("a:b/c<d>e'f\\g|h?i*j k"), "a_b_c_d_e_f_g_h_i_j_k");
    assert_eq!(make_valid("Already_Safe-Name.01"), "Already_Safe-Name.01");
    assert_eq!(make_valid("生命流"), "生命流");
    assert_eq!(make_valid(""), "");
}

#[test]
fn test_random_suffix() {
    let suffix = random_suffix(10);
    assert_eq!(suffix.len(), 10);
    assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    assert_eq!(random_suffix(0), "");
}

#[test]
fn test_format_bytes() {
    assert_eq!(format_bytes(0), "0 B");
    assert_eq!(format_bytes(1023), "1023 B");
    assert_eq!(format_bytes(1024), "1.0 KiB");
    assert_eq!(format_bytes(1536), "1.5 KiB");
    assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GiB");
}

#[test]
fn test_format_rate() {
    assert_eq!(format_rate(1024, Duration::ZERO), "n/a");
    assert_eq!(format_rate(2048, Duration::from_secs(2)), "1.0 KiB/s");
    assert_eq!(format_rate(100, Duration::from_secs(1)), "100 B/s");
}

#[test]
fn test_remove_duplicate_albums_keeps_first() {
    let mut albums = vec![
        create_test_album("1", "First"),
        create_test_album("2", "Second"),
        create_test_album("1", "First again"),
    ];
    remove_duplicate_albums(&mut albums);

    assert_eq!(albums.len(), 2);
    assert_eq!(albums[0].name, "First");
    assert_eq!(albums[1].cid, "2");
}

#[test]
fn test_select_all() {
    let albums = catalog();
    let selected = select_albums_by_query(&albums, "ALL").unwrap();
    assert_eq!(selected.len(), albums.len());

    let selected = select_albums_by_query(&albums, "0003, all").unwrap();
    assert_eq!(selected.len(), albums.len());
}

#[test]
fn test_select_exact_match_beats_substring() {
    let albums = catalog();
    // "sanctuary" is a substring of two names but an exact match of one
    let selected = select_albums_by_query(&albums, "sanctuary").unwrap();
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].cid, "0002");
}

#[test]
fn test_select_by_cid_and_substring_in_query_order() {
    let albums = catalog();
    let selected = select_albums_by_query(&albums, " 0005 , pyrite,,0005").unwrap();
    let cids: Vec<&str> = selected.iter().map(|a| a.cid.as_str()).collect();
    assert_eq!(cids, vec!["0005", "0004"]);
}

#[test]
fn test_select_errors() {
    let albums = catalog();

    let err = select_albums_by_query(&albums, " , ,").unwrap_err();
    assert!(err.contains("no valid album query"));

    let err = select_albums_by_query(&albums, "operation").unwrap_err();
    assert!(err.contains("ambiguous"));
    assert!(err.contains("Operation Blade (0003), Operation Pyrite (0004)"));

    let err = select_albums_by_query(&albums, "missing").unwrap_err();
    assert!(err.contains("not found"));
}

#[test]
fn test_resolve_multiple_exact_matches_asks_for_cid() {
    let albums = vec![create_test_album("a", "Same"), create_test_album("b", "same")];
    let err = resolve_album_query(&albums, "SAME").unwrap_err();
    assert!(err.contains("use CID"));

    let album = resolve_album_query(&albums, "b").unwrap();
    assert_eq!(album.name, "same");
}

#[test]
fn test_filter_albums() {
    let mut albums = catalog();
    filter_albums(&mut albums, "  OPERATION ");
    assert_eq!(albums.len(), 2);

    let mut albums = catalog();
    filter_albums(&mut albums, "");
    assert_eq!(albums.len(), 5);
}

#[test]
fn test_sort_album_table_rows() {
    let row = |cid: &str, name: &str| AlbumTableRow {
        done: String::new(),
        cid: cid.to_string(),
        name: name.to_string(),
        artists: String::new(),
    };
    let mut rows = vec![row("3", "beta"), row("2", "Alpha"), row("1", "alpha")];
    sort_album_table_rows(&mut rows);

    let order: Vec<&str> = rows.iter().map(|r| r.cid.as_str()).collect();
    assert_eq!(order, vec!["1", "2", "3"]);
}
