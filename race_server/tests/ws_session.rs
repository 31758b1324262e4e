mod support;

use serde_json::json;

#[tokio::test]
async fn when_a_private_room_is_shared_then_code_joins_are_case_insensitive() {
    let mut host = support::connect().await;
    support::send(
        &mut host,
        json!({"type": "CreatePrivateRoom", "data": {"pseudo": "Host", "color": "blue"}}),
    )
    .await;
    let joined = support::recv_type(&mut host, "Joined").await;
    assert_eq!(joined["private"], true);
    assert_eq!(joined["isHost"], true);
    let code = joined["roomId"].as_str().expect("room code").to_string();
    assert_eq!(code.len(), 6);

    let mut guest = support::connect().await;
    support::send(
        &mut guest,
        json!({"type": "JoinByCode", "data": {"code": code.to_lowercase(), "pseudo": "Guest"}}),
    )
    .await;
    let guest_joined = support::recv_type(&mut guest, "Joined").await;
    assert_eq!(guest_joined["roomId"], code.as_str());
    assert_eq!(guest_joined["isHost"], false);

    let announced = support::recv_type(&mut host, "PlayerJoined").await;
    assert_eq!(announced["pseudo"], "Guest");
}

#[tokio::test]
async fn when_code_is_unknown_then_error_is_sent_and_socket_stays_usable() {
    let mut ws = support::connect().await;
    support::send(
        &mut ws,
        json!({"type": "JoinByCode", "data": {"code": "ZZZZZZ", "pseudo": "Lost"}}),
    )
    .await;
    let error = support::recv_type(&mut ws, "Error").await;
    assert!(error["reason"].as_str().is_some());

    support::send(&mut ws, json!({"type": "CreatePrivateRoom", "data": {"pseudo": "Found"}})).await;
    let joined = support::recv_type(&mut ws, "Joined").await;
    assert_eq!(joined["private"], true);
}

#[tokio::test]
async fn when_first_message_is_not_a_join_then_connection_is_closed_with_policy() {
    let mut ws = support::connect().await;
    support::send(&mut ws, json!({"type": "SetReady"})).await;

    assert_eq!(support::recv_close_code(&mut ws).await, 1008);
}

#[tokio::test]
async fn when_a_guest_tries_to_start_then_only_they_are_rejected() {
    let mut host = support::connect().await;
    support::send(&mut host, json!({"type": "CreatePrivateRoom", "data": {"pseudo": "Host"}})).await;
    let code = support::recv_type(&mut host, "Joined").await["roomId"]
        .as_str()
        .expect("room code")
        .to_string();

    let mut guest = support::connect().await;
    support::send(
        &mut guest,
        json!({"type": "JoinByCode", "data": {"code": code, "pseudo": "Guest"}}),
    )
    .await;
    support::recv_type(&mut guest, "Joined").await;

    support::send(&mut guest, json!({"type": "HostStart"})).await;
    let error = support::recv_type(&mut guest, "Error").await;
    assert!(error["reason"].as_str().is_some());
}
