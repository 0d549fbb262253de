use trellis_server::DisconnectEvent;
use trellis_shared::ServerMessage;

use trellis_test::{default_server, init_logging, register_at, TestPeer};

#[test]
fn closing_a_connection_clears_every_pool_and_index() {
    init_logging();
    let mut server = default_server();
    let peer = TestPeer::connect(&mut server);
    register_at(
        &mut server,
        &peer,
        "n-1",
        "u-1",
        Some("d-1"),
        Some("c-1"),
        Some("ch-1"),
    );

    server.close_connection(&peer.key);

    let stats = server.stats();
    assert_eq!(server.connections_count(), 0);
    assert!(stats.domains.is_empty());
    assert!(stats.clusters.is_empty());
    assert!(stats.channels.is_empty());

    let mut events = server.receive();
    let closed: Vec<_> = events.read::<DisconnectEvent>().collect();
    assert!(closed.contains(&peer.key));

    // the node id is free again: a fresh registration must not conflict
    let mut replacement = TestPeer::connect(&mut server);
    register_at(&mut server, &replacement, "n-1", "u-9", Some("d-1"), None, None);
    assert!(matches!(
        replacement.drain()[0],
        ServerMessage::RegistrationSuccess
    ));
}

#[test]
fn send_failure_closes_the_dead_connection_mid_fanout() {
    init_logging();
    let mut server = default_server();
    let sender = TestPeer::connect(&mut server);
    let dead = TestPeer::connect(&mut server);
    for (peer, node_id, user_id) in [(&sender, "n-1", "u-1"), (&dead, "n-2", "u-2")] {
        register_at(
            &mut server,
            peer,
            node_id,
            user_id,
            Some("d-1"),
            Some("c-1"),
            Some("ch-1"),
        );
    }
    let dead_key = dead.key;
    // dropping the receiving half makes every future send to this peer fail
    drop(dead);

    server.process_message(
        &sender.key,
        trellis_shared::ClientMessage::ActivityBatch(trellis_shared::ActivityBatch {
            batch_id: "b-1".into(),
            user_id: "u-1".into(),
            timestamp: 0.0,
            events: vec![],
        }),
    );

    // the dead peer was detected and removed; nothing is tracked because no
    // forward succeeded
    assert_eq!(server.connections_count(), 1);
    assert_eq!(server.tracked_batches_count(), 0);

    let mut events = server.receive();
    let closed: Vec<_> = events.read::<DisconnectEvent>().collect();
    assert!(closed.contains(&dead_key));
}

#[test]
fn node_offline_reports_what_the_departure_orphaned() {
    init_logging();
    let mut server = default_server();
    let last = TestPeer::connect(&mut server);
    let peer_in_domain = TestPeer::connect(&mut server);
    register_at(
        &mut server,
        &last,
        "n-1",
        "u-1",
        Some("d-1"),
        Some("c-1"),
        Some("ch-1"),
    );
    // a second node at the domain level keeps d-1 alive after n-1 leaves
    register_at(
        &mut server,
        &peer_in_domain,
        "n-2",
        "u-2",
        Some("d-1"),
        None,
        None,
    );

    let report = server.node_offline(&"n-1".into()).expect("node is connected");
    assert_eq!(report.node_id, "n-1".into());
    assert!(report.emptied_domains.is_empty());
    assert_eq!(report.emptied_clusters, vec!["c-1".into()]);
    assert_eq!(report.emptied_channels, vec!["ch-1".into()]);

    assert_eq!(server.connections_count(), 1);
    let stats = server.stats();
    assert_eq!(stats.domains.len(), 1);
    assert!(stats.clusters.is_empty());

    // asking again finds nothing
    assert!(server.node_offline(&"n-1".into()).is_none());
}
