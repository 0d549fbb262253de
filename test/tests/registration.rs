use trellis_server::{ErrorEvent, RegistrationEvent, RejectionEvent, ServerError};
use trellis_shared::ServerMessage;

use trellis_test::{
    default_server, find_command, init_logging, register, register_at, TestPeer,
};

#[test]
fn bare_registration_succeeds_and_starts_placement() {
    init_logging();
    let mut server = default_server();
    let mut peer = TestPeer::connect(&mut server);

    register(&mut server, &peer, "n-1", "u-1");

    let messages = peer.drain();
    assert!(matches!(messages[0], ServerMessage::RegistrationSuccess));
    // no domain exists yet, so placement opens with a creation command
    find_command(&messages, "new_domain_node");

    let mut events = server.receive();
    let registered: Vec<_> = events.read::<RegistrationEvent>().collect();
    assert_eq!(registered, vec![peer.key]);
}

#[test]
fn full_hierarchy_registration_needs_no_commands() {
    init_logging();
    let mut server = default_server();
    let mut peer = TestPeer::connect(&mut server);

    register_at(
        &mut server,
        &peer,
        "n-1",
        "u-1",
        Some("d-1"),
        Some("c-1"),
        Some("ch-1"),
    );

    let messages = peer.drain();
    assert!(matches!(messages[0], ServerMessage::RegistrationSuccess));
    assert_eq!(messages.len(), 1);
    assert_eq!(server.pending_requests_count(), 0);

    let stats = server.stats();
    assert_eq!(stats.domains.len(), 1);
    assert_eq!(stats.clusters.len(), 1);
    assert_eq!(stats.channels.len(), 1);
    assert_eq!(stats.channels[0].member_nodes, vec!["n-1".into()]);
}

#[test]
fn node_conflict_under_different_user_is_rejected() {
    init_logging();
    let mut server = default_server();
    let first = TestPeer::connect(&mut server);
    let mut second = TestPeer::connect(&mut server);

    register_at(&mut server, &first, "n-1", "u-1", Some("d-1"), None, None);
    register(&mut server, &second, "n-1", "u-2");

    let messages = second.drain();
    assert!(matches!(
        messages[0],
        ServerMessage::RegistrationRejected { .. }
    ));
    // the conflicting connection is closed, the original stays
    assert_eq!(server.connections_count(), 1);

    let mut events = server.receive();
    let rejected: Vec<_> = events.read::<RejectionEvent>().collect();
    assert_eq!(rejected, vec![second.key]);
    assert!(events
        .read::<ErrorEvent>()
        .any(|error| matches!(error, ServerError::RegistrationConflict(_))));
}

#[test]
fn same_user_reconnect_takes_over_the_node() {
    init_logging();
    let mut server = default_server();
    let first = TestPeer::connect(&mut server);
    let mut second = TestPeer::connect(&mut server);

    register_at(
        &mut server,
        &first,
        "n-1",
        "u-1",
        Some("d-1"),
        Some("c-1"),
        Some("ch-1"),
    );
    register_at(
        &mut server,
        &second,
        "n-1",
        "u-1",
        Some("d-1"),
        Some("c-1"),
        Some("ch-1"),
    );

    assert!(matches!(
        second.drain()[0],
        ServerMessage::RegistrationSuccess
    ));
    assert_eq!(server.connections_count(), 1);

    // the pool entry was replaced, not duplicated
    let stats = server.stats();
    assert_eq!(stats.channels[0].member_count, 1);
    assert_eq!(stats.channels[0].member_nodes, vec!["n-1".into()]);
}

#[test]
fn re_registration_replaces_stale_pool_membership() {
    init_logging();
    let mut server = default_server();
    let mut peer = TestPeer::connect(&mut server);

    register_at(
        &mut server,
        &peer,
        "n-1",
        "u-1",
        Some("d-1"),
        Some("c-1"),
        Some("ch-1"),
    );

    // the same transport moves to another domain and gives up its channel
    register_at(&mut server, &peer, "n-1", "u-1", Some("d-2"), None, None);
    peer.drain();

    let stats = server.stats();
    assert_eq!(stats.domains.len(), 1);
    assert_eq!(stats.domains[0].id, "d-2");
    assert!(stats.clusters.is_empty());
    assert!(stats.channels.is_empty());
    assert_eq!(server.connections_count(), 1);
}

#[test]
fn hierarchy_with_gaps_is_truncated_top_down() {
    init_logging();
    let mut server = default_server();
    let mut peer = TestPeer::connect(&mut server);

    // channel without cluster: the channel id must be dropped and placement
    // resumed at the cluster level
    register_at(&mut server, &peer, "n-1", "u-1", Some("d-1"), None, Some("ch-1"));

    let messages = peer.drain();
    assert!(matches!(messages[0], ServerMessage::RegistrationSuccess));

    let stats = server.stats();
    assert_eq!(stats.domains.len(), 1);
    assert!(stats.channels.is_empty());
    // no cluster exists under d-1 yet, so the next step is creation
    find_command(&messages, "new_cluster_node");
}
