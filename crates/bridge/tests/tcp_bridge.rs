use std::{sync::Arc, time::Duration};

use bridge::{
    listener::serve_bridge, DeviceLink, DeviceMethodDispatcher, InMemoryDeviceModel,
};
use shared::domain::Invocation;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};

async fn wait_until_ready(link: &DeviceLink) {
    for _ in 0..200 {
        if link.is_ready().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("bridge never became ready");
}

#[tokio::test]
async fn controller_over_tcp_drives_a_start_call() {
    let model = Arc::new(InMemoryDeviceModel::with_skills(["Belt1"]));
    let link = DeviceLink::new("conveyor", model);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let server = tokio::spawn(serve_bridge(
        listener,
        Arc::clone(&link),
        Duration::from_secs(2),
    ));

    let stream = TcpStream::connect(addr).await.expect("connect");
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    write.write_all(b"Belt1;INIT\n").await.expect("init");
    assert_eq!(
        lines.next_line().await.expect("read").as_deref(),
        Some("Belt1;RET;OK")
    );
    wait_until_ready(&link).await;

    let dispatcher = DeviceMethodDispatcher::new(Arc::clone(&link));
    let call = tokio::spawn(async move {
        dispatcher
            .dispatch(&Invocation::new("Belt1", "Start", "slow"))
            .await
    });
    assert_eq!(
        lines.next_line().await.expect("read").as_deref(),
        Some("Belt1;CALL;START;slow")
    );
    write
        .write_all(b"Belt1;CALLRET;START;OK\r\n")
        .await
        .expect("reply");

    let output = call.await.expect("join").expect("dispatch");
    assert_eq!(output, "Belt1 command Start sent with input arguments: slow");

    drop(write);
    drop(lines);
    for _ in 0..200 {
        if !link.is_ready().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!link.is_ready().await);
    server.abort();
}
