//! Raw SCPI socket transport against a loopback fake instrument.

use power_cycler::adapters::{ScpiTransport, TcpScpiAdapterBuilder};
use power_cycler::instrument::{Channel, Measurement, PowerSupply};
use power_cycler::CyclerError;
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Accept one session, record every raw line received and answer queries
/// from `responses`. Queries without a scripted answer get no reply.
async fn fake_instrument(
    responses: HashMap<&'static str, &'static str>,
) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (reader, mut writer) = socket.into_split();
        let mut reader = BufReader::new(reader);
        let mut received = Vec::new();
        loop {
            let mut raw = String::new();
            if reader.read_line(&mut raw).await.unwrap_or(0) == 0 {
                break;
            }
            let command = raw.trim_end().to_string();
            received.push(raw);
            if let Some(answer) = responses.get(command.as_str()) {
                if writer.write_all(answer.as_bytes()).await.is_err() {
                    break;
                }
            }
        }
        received
    });

    (addr, handle)
}

#[tokio::test]
async fn test_session_round_trip() {
    let responses = HashMap::from([
        ("*IDN?", "Rohde&Schwarz,NGP804,101234,2.015\n"),
        ("READ?", "  3.3001,0.0987 \r\n"),
    ]);
    let (addr, instrument) = fake_instrument(responses).await;

    let transport = TcpScpiAdapterBuilder::new(addr.clone())
        .with_timeout(Duration::from_secs(2))
        .connect()
        .await
        .unwrap();
    assert!(transport.is_open());
    assert_eq!(transport.endpoint(), addr);

    let mut psu = PowerSupply::new(transport);
    assert_eq!(
        psu.identify().await.unwrap(),
        "Rohde&Schwarz,NGP804,101234,2.015"
    );
    psu.set_master_output(false).await.unwrap();
    let reading = psu.measure(Channel::new(3)).await.unwrap();
    assert_eq!(
        reading,
        Measurement {
            voltage: 3.3001,
            current: 0.0987
        }
    );
    psu.close().await;
    assert!(!psu.is_open());

    assert_eq!(
        instrument.await.unwrap(),
        vec![
            "*IDN?\n",
            "OUTPut:GENeral:STATe OFF\n",
            "INSTrument:SELect 3\n",
            "READ?\n",
        ]
    );
}

#[tokio::test]
async fn test_custom_terminators() {
    let responses = HashMap::from([("*IDN?", "NGP814\r\n")]);
    let (addr, instrument) = fake_instrument(responses).await;

    let mut transport = TcpScpiAdapterBuilder::new(addr)
        .with_write_terminator("\r\n")
        .with_read_terminator("\r\n")
        .connect()
        .await
        .unwrap();
    assert_eq!(transport.query("*IDN?").await.unwrap(), "NGP814");
    transport.close().await;

    assert_eq!(instrument.await.unwrap(), vec!["*IDN?\r\n"]);
}

#[tokio::test]
async fn test_query_times_out_without_answer() {
    let (addr, _instrument) = fake_instrument(HashMap::new()).await;

    let mut transport = TcpScpiAdapterBuilder::new(addr)
        .with_timeout(Duration::from_millis(200))
        .connect()
        .await
        .unwrap();

    let err = transport.query("READ?").await.unwrap_err();
    assert!(matches!(err, CyclerError::Command { ref command, .. } if command == "READ?"));
    assert!(err.to_string().contains("no response"));
    assert!(!transport.is_open());
}

#[tokio::test]
async fn test_late_reply_is_never_taken_for_next_answer() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (reader, mut writer) = socket.into_split();
        let mut reader = BufReader::new(reader);
        loop {
            let mut raw = String::new();
            if reader.read_line(&mut raw).await.unwrap_or(0) == 0 {
                break;
            }
            let answer = match raw.trim_end() {
                "READ?" => {
                    tokio::time::sleep(Duration::from_millis(400)).await;
                    "3.3000,0.0660\n"
                }
                _ => "5.1000,0.0500\n",
            };
            if writer.write_all(answer.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let mut transport = TcpScpiAdapterBuilder::new(addr)
        .with_timeout(Duration::from_millis(200))
        .connect()
        .await
        .unwrap();

    assert!(transport.query("READ?").await.is_err());
    tokio::time::sleep(Duration::from_millis(400)).await;

    let err = transport.query("MEASure?").await.unwrap_err();
    assert!(err.to_string().contains("session closed"));
}

#[tokio::test]
async fn test_response_keeps_leading_whitespace() {
    let responses = HashMap::from([("SYSTem:ERRor?", "  0,\"No error\"\r\n")]);
    let (addr, _instrument) = fake_instrument(responses).await;

    let mut transport = TcpScpiAdapterBuilder::new(addr).connect().await.unwrap();
    assert_eq!(
        transport.query("SYSTem:ERRor?").await.unwrap(),
        "  0,\"No error\""
    );
}

#[tokio::test]
async fn test_instrument_hangup_is_command_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        drop(socket);
    });

    let mut transport = TcpScpiAdapterBuilder::new(addr)
        .with_timeout(Duration::from_secs(2))
        .connect()
        .await
        .unwrap();
    server.await.unwrap();

    let err = transport.query("*IDN?").await.unwrap_err();
    assert!(matches!(err, CyclerError::Command { .. }));
}

#[tokio::test]
async fn test_refused_connection_is_connect_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let result = TcpScpiAdapterBuilder::new(addr.clone())
        .with_timeout(Duration::from_secs(2))
        .connect()
        .await;
    match result {
        Err(CyclerError::Connect { endpoint, .. }) => assert_eq!(endpoint, addr),
        Err(other) => panic!("expected connect error, got {}", other),
        Ok(_) => panic!("connected to a closed port"),
    }
}

#[tokio::test]
async fn test_closed_session_rejects_commands() {
    let (addr, _instrument) = fake_instrument(HashMap::new()).await;
    let mut transport = TcpScpiAdapterBuilder::new(addr).connect().await.unwrap();

    transport.close().await;
    transport.close().await;
    assert!(!transport.is_open());

    let err = transport.send("*RST").await.unwrap_err();
    assert!(err.to_string().contains("session closed"));
}
