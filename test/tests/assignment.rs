use std::time::Duration;

use trellis_server::{AssignmentEvent, ErrorEvent, Server, ServerConfig, ServerError};
use trellis_shared::ServerMessage;

use trellis_test::{
    data_count, default_server, find_command, init_logging, place_founder, register, reply_err,
    reply_ok, TestPeer,
};

#[test]
fn first_node_creates_the_full_chain() {
    init_logging();
    let mut server = default_server();
    let mut peer = TestPeer::connect(&mut server);

    place_founder(
        &mut server, &mut peer, "n-1", "u-1", "d-1", "c-1", "ch-1",
    );

    let stats = server.stats();
    assert_eq!(stats.domains[0].member_nodes, vec!["n-1".into()]);
    assert_eq!(stats.clusters[0].member_nodes, vec!["n-1".into()]);
    assert_eq!(stats.channels[0].member_nodes, vec!["n-1".into()]);

    // the creator becomes main node at every level it created
    let node = &stats.nodes[0];
    assert!(node.is_domain_main);
    assert!(node.is_cluster_main);
    assert!(node.is_channel_main);

    let mut events = server.receive();
    let placed: Vec<_> = events.read::<AssignmentEvent>().collect();
    assert_eq!(placed, vec![peer.key]);
    assert_eq!(server.pending_requests_count(), 0);
}

#[test]
fn second_node_probes_members_and_attaches() {
    init_logging();
    let mut server = default_server();
    let mut founder = TestPeer::connect(&mut server);
    place_founder(
        &mut server, &mut founder, "n-1", "u-1", "d-1", "c-1", "ch-1",
    );
    let _ = server.receive();

    let mut joiner = TestPeer::connect(&mut server);
    register(&mut server, &joiner, "n-2", "u-2");
    joiner.drain();

    // domain probe goes to the existing member, not the joiner
    let request_id = find_command(&founder.drain(), "count_peers_amount");
    reply_ok(&mut server, &founder, request_id, "count_peers_amount", data_count(1));

    let messages = joiner.drain();
    let request_id = find_command(&messages, "assign_to_domain");
    assert!(messages
        .iter()
        .any(|message| matches!(message, ServerMessage::AssignToDomain { domain_id, .. } if domain_id.as_str() == "d-1")));
    reply_ok(&mut server, &joiner, request_id, "assign_to_domain", data_count(0));

    // cluster level
    let request_id = find_command(&founder.drain(), "count_peers_amount");
    reply_ok(&mut server, &founder, request_id, "count_peers_amount", data_count(1));
    let request_id = find_command(&joiner.drain(), "assign_to_cluster");
    reply_ok(&mut server, &joiner, request_id, "assign_to_cluster", data_count(0));

    // channel level
    let request_id = find_command(&founder.drain(), "count_peers_amount");
    reply_ok(&mut server, &founder, request_id, "count_peers_amount", data_count(1));
    let request_id = find_command(&joiner.drain(), "assign_to_channel");
    reply_ok(&mut server, &joiner, request_id, "assign_to_channel", data_count(0));

    // the founder learns about its new channel peer
    assert!(founder.drain().iter().any(|message| matches!(
        message,
        ServerMessage::AddNewNodeToPeers { node_id, .. } if node_id.as_str() == "n-2"
    )));

    let stats = server.stats();
    assert_eq!(stats.channels[0].member_count, 2);
    let joined = stats
        .nodes
        .iter()
        .find(|node| node.node_id.as_str() == "n-2")
        .expect("joiner is registered");
    assert!(!joined.is_domain_main);
    assert_eq!(joined.channel_id, Some("ch-1".into()));

    let mut events = server.receive();
    let placed: Vec<_> = events.read::<AssignmentEvent>().collect();
    assert_eq!(placed, vec![joiner.key]);
}

#[test]
fn full_level_falls_through_to_creation() {
    init_logging();
    let mut server = Server::new(ServerConfig {
        level_capacity: 1,
        ..ServerConfig::default()
    });
    let mut founder = TestPeer::connect(&mut server);
    place_founder(
        &mut server, &mut founder, "n-1", "u-1", "d-1", "c-1", "ch-1",
    );

    let mut joiner = TestPeer::connect(&mut server);
    register(&mut server, &joiner, "n-2", "u-2");

    // the only domain reports itself full, so the joiner is told to found a
    // new one
    let request_id = find_command(&founder.drain(), "count_peers_amount");
    reply_ok(&mut server, &founder, request_id, "count_peers_amount", data_count(1));

    find_command(&joiner.drain(), "new_domain_node");
}

#[test]
fn unanswerable_probe_attaches_optimistically() {
    init_logging();
    let mut server = Server::new(ServerConfig {
        request_timeout: Duration::ZERO,
        ..ServerConfig::default()
    });
    let mut founder = TestPeer::connect(&mut server);
    place_founder(
        &mut server, &mut founder, "n-1", "u-1", "d-1", "c-1", "ch-1",
    );
    let _ = server.receive();

    let mut joiner = TestPeer::connect(&mut server);
    register(&mut server, &joiner, "n-2", "u-2");
    joiner.drain();
    find_command(&founder.drain(), "count_peers_amount");

    // the probe times out; with no other member to ask, the capacity check
    // is skipped and the attach goes out anyway
    server.update();

    find_command(&joiner.drain(), "assign_to_domain");
    let mut events = server.receive();
    assert!(events
        .read::<ErrorEvent>()
        .any(|error| matches!(error, ServerError::RequestTimeout { .. })));
}

#[test]
fn refused_creation_exhausts_placement() {
    init_logging();
    let mut server = default_server();
    let mut peer = TestPeer::connect(&mut server);

    register(&mut server, &peer, "n-1", "u-1");
    let request_id = find_command(&peer.drain(), "new_domain_node");
    reply_err(&mut server, &peer, request_id, "new_domain_node");

    let mut events = server.receive();
    assert!(events
        .read::<ErrorEvent>()
        .any(|error| matches!(error, ServerError::AssignmentExhausted(_))));
    // the connection stays open and unplaced
    assert_eq!(server.connections_count(), 1);
    assert!(server.stats().domains.is_empty());
}
