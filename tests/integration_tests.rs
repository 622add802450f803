// Integration tests for full request/response cycles
//
// Each test starts an in-process cluster on ephemeral ports and talks to it
// over real TCP connections:
// - Connection setup (SASL, SELECT_BUCKET, cluster config)
// - DCP open / control / stream request with replay
// - Error recovery (unknown commands, malformed frames, dropped clients)
// - Shutdown

mod helpers;

use helpers::{
    keys_in_vbucket, open_request, set_request, stream_request, test_config, TestClient,
};
use memd_mock::memd::constants::*;
use memd_mock::memd::protocol::{Magic, Packet};
use memd_mock::MockServer;

#[tokio::test]
async fn test_dcp_stream_end_to_end() {
    let server = MockServer::start(&test_config(3)).await.unwrap();
    let mut client = TestClient::connect(server.node_addrs()[0]).await;
    client.login("default").await;

    // vbucket 0 is primary on node 0
    let written = keys_in_vbucket(0, 3);
    for (i, key) in written.iter().enumerate() {
        let resp = client.request(set_request(0, key, r#"{"n":1}"#, i as u32)).await;
        assert_eq!(resp.status, STATUS_SUCCESS);
    }

    let open = client.request(open_request("it-feed", 100)).await;
    assert_eq!(open.opcode, CMD_DCP_OPEN_CONNECTION);
    assert_eq!(open.status, STATUS_SUCCESS);
    assert_eq!(open.opaque, 100);

    let control = client
        .request(
            Packet::request(CMD_DCP_CONTROL)
                .with_opaque(101)
                .with_key("enable_noop")
                .with_value("true"),
        )
        .await;
    assert_eq!(control.status, STATUS_SUCCESS);
    assert_eq!(control.opaque, 101);

    client.send(stream_request(0, 0x7a, 0, u64::MAX)).await;
    let frames = client.recv_stream(0x7a).await;

    let opcodes: Vec<u8> = frames.iter().map(|p| p.opcode).collect();
    assert_eq!(
        opcodes,
        vec![
            CMD_DCP_STREAM_REQ,
            CMD_DCP_SNAPSHOT_MARKER,
            CMD_DCP_MUTATION,
            CMD_DCP_MUTATION,
            CMD_DCP_MUTATION,
            CMD_DCP_STREAM_END,
        ]
    );
    assert_eq!(frames[0].magic, Magic::Response);
    assert_eq!(frames[0].status, STATUS_SUCCESS);
    assert!(frames[1..].iter().all(|p| p.magic == Magic::Request));
    assert_eq!(&frames[1].extras[8..16], &3u64.to_be_bytes());

    let keys: Vec<&[u8]> = frames[2..5].iter().map(|p| p.key.as_ref()).collect();
    let expected: Vec<&[u8]> = written.iter().map(|k| k.as_bytes()).collect();
    assert_eq!(keys, expected);
    let seqnos: Vec<u64> = frames[2..5]
        .iter()
        .map(|p| u64::from_be_bytes(p.extras[0..8].try_into().unwrap()))
        .collect();
    assert_eq!(seqnos, vec![1, 2, 3]);
    assert_eq!(frames[5].extras.as_ref(), &DCP_STREAM_END_OK.to_be_bytes());

    // connection stays usable after the stream
    let noop = client.request(Packet::request(CMD_NOOP).with_opaque(9)).await;
    assert_eq!(noop.status, STATUS_SUCCESS);

    server.shutdown().await;
}

#[tokio::test]
async fn test_stream_request_on_foreign_vbucket() {
    let server = MockServer::start(&test_config(3)).await.unwrap();
    // node 1 is neither primary nor replica of vbucket 2 with one replica:
    // vb 2 -> primary node 2, replica node 0
    let mut client = TestClient::connect(server.node_addrs()[1]).await;
    client.login("default").await;
    client.request(open_request("feed", 1)).await;

    let resp = client.request(stream_request(2, 5, 0, 10)).await;
    assert_eq!(resp.status, STATUS_NOT_MY_VBUCKET);
    assert_eq!(resp.opaque, 5);
    let config: serde_json::Value = serde_json::from_slice(&resp.value).unwrap();
    assert_eq!(config["name"], "default");
    assert_eq!(config["vBucketServerMap"]["serverList"].as_array().unwrap().len(), 3);

    server.shutdown().await;
}

#[tokio::test]
async fn test_set_with_key_of_another_vbucket() {
    let server = MockServer::start(&test_config(1)).await.unwrap();
    let mut client = TestClient::connect(server.node_addrs()[0]).await;
    client.login("default").await;

    // a single node owns every vbucket, so only the key placement is wrong
    let key = keys_in_vbucket(5, 1).remove(0);
    let resp = client.request(set_request(4, &key, "v", 1)).await;
    assert_eq!(resp.status, STATUS_NOT_MY_VBUCKET);

    let resp = client.request(set_request(5, &key, "v", 2)).await;
    assert_eq!(resp.status, STATUS_SUCCESS);

    let get = client
        .request(Packet::request(CMD_GET).with_vbucket(5).with_key(key))
        .await;
    assert_eq!(get.status, STATUS_SUCCESS);
    assert_eq!(get.value.as_ref(), b"v");

    server.shutdown().await;
}

#[tokio::test]
async fn test_select_bucket_requires_auth() {
    let server = MockServer::start(&test_config(1)).await.unwrap();
    let mut client = TestClient::connect(server.node_addrs()[0]).await;

    let resp = client
        .request(Packet::request(CMD_SELECT_BUCKET).with_key("default"))
        .await;
    assert_eq!(resp.status, STATUS_AUTH_ERROR);

    let mechs = client.request(Packet::request(CMD_SASL_LIST_MECHS)).await;
    assert_eq!(mechs.value.as_ref(), b"PLAIN");

    client.login("default").await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_unknown_command_keeps_connection() {
    let server = MockServer::start(&test_config(1)).await.unwrap();
    let mut client = TestClient::connect(server.node_addrs()[0]).await;

    let resp = client.request(Packet::request(0xee).with_opaque(31)).await;
    assert_eq!(resp.status, STATUS_UNKNOWN_COMMAND);
    assert_eq!(resp.opcode, 0xee);
    assert_eq!(resp.opaque, 31);

    let noop = client.request(Packet::request(CMD_NOOP).with_opaque(32)).await;
    assert_eq!(noop.status, STATUS_SUCCESS);
    assert_eq!(noop.opaque, 32);

    server.shutdown().await;
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection() {
    let server = MockServer::start(&test_config(1)).await.unwrap();
    let mut client = TestClient::connect(server.node_addrs()[0]).await;

    // unknown magic 0x42, opcode NOOP, opaque 0x0102_0304, empty body
    let mut frame = [0u8; HEADER_LEN];
    frame[0] = 0x42;
    frame[1] = CMD_NOOP;
    frame[12..16].copy_from_slice(&0x0102_0304u32.to_be_bytes());
    client.send_raw(&frame).await;

    let resp = client.recv().await.unwrap();
    assert_eq!(resp.status, STATUS_EINVAL);
    assert_eq!(resp.opaque, 0x0102_0304);

    let noop = client.request(Packet::request(CMD_NOOP).with_opaque(2)).await;
    assert_eq!(noop.status, STATUS_SUCCESS);

    server.shutdown().await;
}

#[tokio::test]
async fn test_dropped_client_does_not_affect_others() {
    let server = MockServer::start(&test_config(3)).await.unwrap();
    let addr = server.node_addrs()[0];

    {
        let mut client = TestClient::connect(addr).await;
        client.login("default").await;
        for (i, key) in keys_in_vbucket(0, 50).iter().enumerate() {
            let resp = client.request(set_request(0, key, "v", i as u32)).await;
            assert_eq!(resp.status, STATUS_SUCCESS);
        }
        client.request(open_request("doomed", 1)).await;
        // request a stream and disconnect without reading it
        client.send(stream_request(0, 2, 0, u64::MAX)).await;
    }

    let mut other = TestClient::connect(addr).await;
    other.login("default").await;
    other.request(open_request("survivor", 1)).await;
    other.send(stream_request(0, 3, 0, u64::MAX)).await;
    let frames = other.recv_stream(3).await;
    assert_eq!(frames.len(), 50 + 3);
    assert_eq!(frames.last().unwrap().opcode, CMD_DCP_STREAM_END);

    server.shutdown().await;
}

#[tokio::test]
async fn test_cluster_config_lists_all_nodes() {
    let server = MockServer::start(&test_config(3)).await.unwrap();
    let mut client = TestClient::connect(server.node_addrs()[2]).await;

    let resp = client.request(Packet::request(CMD_GET_CLUSTER_CONFIG)).await;
    assert_eq!(resp.status, STATUS_SUCCESS);
    let config: serde_json::Value = serde_json::from_slice(&resp.value).unwrap();
    let nodes = config["nodesExt"].as_array().unwrap();
    assert_eq!(nodes.len(), 3);
    let ports: Vec<u64> = nodes
        .iter()
        .map(|n| n["services"]["kv"].as_u64().unwrap())
        .collect();
    let expected: Vec<u64> = server
        .node_addrs()
        .iter()
        .map(|a| u64::from(a.port()))
        .collect();
    assert_eq!(ports, expected);

    server.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_closes_connections() {
    let server = MockServer::start(&test_config(1)).await.unwrap();
    let addr = server.node_addrs()[0];
    let mut client = TestClient::connect(addr).await;
    assert_eq!(
        client.request(Packet::request(CMD_NOOP)).await.status,
        STATUS_SUCCESS
    );

    server.shutdown().await;
    assert!(client.recv().await.is_none());
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}
