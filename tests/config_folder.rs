//! Secret folder loading (`FFOLDER`)

use civic_feed::config::load_env_folder;
use std::fs;

#[test]
fn folder_files_become_env_vars() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("CIVIC_FEED_TEST_SECRET"), "s3cret\n").unwrap();
    fs::write(dir.path().join("CIVIC_FEED_TEST_KEPT"), "from-file").unwrap();
    fs::create_dir(dir.path().join("nested")).unwrap();

    std::env::set_var("CIVIC_FEED_TEST_KEPT", "from-env");
    load_env_folder(dir.path());

    assert_eq!(std::env::var("CIVIC_FEED_TEST_SECRET").unwrap(), "s3cret");
    // Existing variables win over files
    assert_eq!(std::env::var("CIVIC_FEED_TEST_KEPT").unwrap(), "from-env");
    assert!(std::env::var("nested").is_err());
}

#[test]
fn missing_folder_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("does-not-exist");
    load_env_folder(&missing);
}
