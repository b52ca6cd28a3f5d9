//! Host-state assertions with readable failure messages.

use crate::testing::host::{SERVER_USER, TestHost};

/// Assert that `alias` is fully published: mounted, recorded, granted.
pub fn assert_published(host: &TestHost, alias: &str) {
    let destination = host.docroot().join(alias);
    assert!(
        host.mounts.is_mounted(&destination),
        "{alias}: expected a bind mount at {}",
        destination.display()
    );

    let source = match host.context.records.read(alias) {
        Ok(Some(source)) => source,
        Ok(None) => panic!("{alias}: expected a record in {}", host.state_dir().display()),
        Err(e) => panic!("{alias}: failed to read record: {e}"),
    };
    assert!(
        host.acl.access_of(&source, SERVER_USER).is_some(),
        "{alias}: expected {SERVER_USER} to have access to {}",
        source.display()
    );
}

/// Assert that nothing of `alias` remains: no mount, no directory, no
/// record and no ACL entry for the server user anywhere.
pub fn assert_unpublished(host: &TestHost, alias: &str) {
    let destination = host.docroot().join(alias);
    assert!(
        !host.mounts.is_mounted(&destination),
        "{alias}: {} is still mounted",
        destination.display()
    );
    assert!(
        !destination.exists(),
        "{alias}: {} still exists",
        destination.display()
    );
    match host.context.records.read(alias) {
        Ok(None) => {}
        Ok(Some(source)) => panic!("{alias}: record still points at {}", source.display()),
        Err(e) => panic!("{alias}: failed to read record: {e}"),
    }

    let remaining = host.acl.granted_paths(SERVER_USER);
    assert!(
        remaining.is_empty(),
        "{alias}: {SERVER_USER} still has ACL entries on {remaining:?}"
    );
}
