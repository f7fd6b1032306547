//! Tests for the Request Dispatcher
//!
//! Calls go through `KvService::dispatch` into an in-memory sink, so every
//! frame a client would see can be checked without a socket.

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{test_config, TestEngine};
use tenantkv::protocol::{
    DeleteRequest, GetRequest, PutRequest, Request, RequestEnvelope, Response, RpcStatus,
    StatusCode, StreamGetRequest,
};
use tenantkv::service::ResponseSink;
use tenantkv::{DbManager, KvService, Query, Result, StorageEngine, TenantError};

// =============================================================================
// Helper Functions
// =============================================================================

fn service<E: StorageEngine>(config: &tenantkv::Config) -> KvService<E> {
    KvService::new(Arc::new(DbManager::new(config)))
}

fn call<E: StorageEngine>(service: &KvService<E>, request: Request) -> Vec<Response> {
    let mut sink = Vec::new();
    service
        .dispatch(RequestEnvelope::new(request), Instant::now(), &mut sink)
        .unwrap();
    sink
}

fn put(db: &str, key: &[u8], value: &[u8]) -> Request {
    Request::Put(PutRequest {
        database: db.to_string(),
        key: key.to_vec(),
        value: value.to_vec(),
    })
}

fn get(db: &str, key: &[u8]) -> Request {
    Request::Get(GetRequest {
        database: db.to_string(),
        key: key.to_vec(),
    })
}

fn stream(db: &str, query: Query) -> Request {
    Request::StreamGet(StreamGetRequest {
        database: db.to_string(),
        query,
    })
}

fn status_code(responses: &[Response]) -> Option<StatusCode> {
    match responses.last() {
        Some(Response::Status(status)) => Some(status.code),
        _ => None,
    }
}

/// Takes every frame, but slowly
struct SlowSink {
    delay: Duration,
    received: Vec<Response>,
}

impl ResponseSink for SlowSink {
    fn send(&mut self, response: Response) -> Result<()> {
        std::thread::sleep(self.delay);
        self.received.push(response);
        Ok(())
    }
}

/// Accepts a fixed number of frames, then fails like a closed socket
struct FailingSink {
    remaining: usize,
    received: Vec<Response>,
}

impl ResponseSink for FailingSink {
    fn send(&mut self, response: Response) -> Result<()> {
        if self.remaining == 0 {
            return Err(TenantError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "peer gone",
            )));
        }
        self.remaining -= 1;
        self.received.push(response);
        Ok(())
    }
}

// =============================================================================
// Point Operation Tests
// =============================================================================

#[test]
fn test_put_get_delete_round_trip() {
    let (_temp, config) = test_config();
    let service = service::<tenantkv::LsmEngine>(&config);

    let responses = call(&service, put("users", b"k", b"v"));
    assert!(matches!(&responses[..], [Response::Put(r)] if r.success && r.error.is_empty()));

    let responses = call(&service, get("users", b"k"));
    assert!(matches!(&responses[..], [Response::Get(r)] if r.found && r.value == b"v"));

    let responses = call(
        &service,
        Request::Delete(DeleteRequest {
            database: "users".to_string(),
            key: b"k".to_vec(),
        }),
    );
    assert!(matches!(&responses[..], [Response::Delete(r)] if r.success));

    let responses = call(&service, get("users", b"k"));
    assert!(matches!(&responses[..], [Response::Get(r)] if !r.found && r.error.is_empty()));
}

#[test]
fn test_delete_absent_key_succeeds() {
    let (_temp, config) = test_config();
    let service = service::<tenantkv::LsmEngine>(&config);

    let responses = call(
        &service,
        Request::Delete(DeleteRequest {
            database: "users".to_string(),
            key: b"missing".to_vec(),
        }),
    );
    assert!(matches!(&responses[..], [Response::Delete(r)] if r.success));
}

#[test]
fn test_empty_database_name_is_invalid_argument() {
    let (temp, config) = test_config();
    let service = service::<tenantkv::LsmEngine>(&config);

    for request in [put("", b"k", b"v"), get("", b"k"), stream("", Query::Prefix(Vec::new()))] {
        let responses = call(&service, request);
        assert_eq!(responses.len(), 1);
        assert_eq!(status_code(&responses), Some(StatusCode::InvalidArgument));
    }
    assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
}

#[test]
fn test_empty_key_is_invalid_argument() {
    let (_temp, config) = test_config();
    let service = service::<tenantkv::LsmEngine>(&config);

    let responses = call(&service, put("users", b"", b"v"));
    assert_eq!(status_code(&responses), Some(StatusCode::InvalidArgument));
}

#[test]
fn test_read_failure_stays_in_response_body() {
    let (_temp, config) = test_config();
    let service = service::<TestEngine>(&config);

    let responses = call(&service, get("users", common::POISONED_KEY));
    match &responses[..] {
        [Response::Get(r)] => {
            assert!(!r.found);
            assert!(r.error.contains("injected read failure"));
        }
        other => panic!("unexpected responses: {:?}", other),
    }
}

#[test]
fn test_write_failure_stays_in_response_body() {
    let (_temp, config) = test_config();
    let service = service::<TestEngine>(&config);

    let put_req = PutRequest {
        database: "users".to_string(),
        key: common::READ_ONLY_KEY.to_vec(),
        value: b"v".to_vec(),
    };
    let resp = service.put(put_req, None).unwrap();
    assert!(!resp.success);
    assert!(resp.error.contains("injected write failure"));

    let delete_req = DeleteRequest {
        database: "users".to_string(),
        key: common::READ_ONLY_KEY.to_vec(),
    };
    let resp = service.delete(delete_req, None).unwrap();
    assert!(!resp.success);
    assert!(resp.error.contains("injected write failure"));

    // Over dispatch the failure is a body, not a status
    let responses = call(&service, put("users", common::READ_ONLY_KEY, b"v"));
    assert!(matches!(&responses[..], [Response::Put(r)] if !r.success && !r.error.is_empty()));

    // Other keys in the same database still work
    let responses = call(&service, put("users", b"open", b"v"));
    assert!(matches!(&responses[..], [Response::Put(r)] if r.success));
}

#[test]
fn test_ping() {
    let (_temp, config) = test_config();
    let service = service::<tenantkv::LsmEngine>(&config);

    assert_eq!(call(&service, Request::Ping), vec![Response::Pong]);
    assert!(service.manager().is_empty());
}

// =============================================================================
// Streaming Tests
// =============================================================================

#[test]
fn test_prefix_stream_frames() {
    let (_temp, config) = test_config();
    let service = service::<tenantkv::LsmEngine>(&config);

    for key in ["a1", "a2", "b1"] {
        call(&service, put("scan", key.as_bytes(), b"v"));
    }

    let responses = call(&service, stream("scan", Query::Prefix(b"a".to_vec())));

    assert_eq!(responses.len(), 3);
    assert!(matches!(&responses[0], Response::Item(i) if i.key == b"a1"));
    assert!(matches!(&responses[1], Response::Item(i) if i.key == b"a2"));
    assert_eq!(responses[2], Response::End);
}

#[test]
fn test_multi_key_partial_failure_completes() {
    let (_temp, config) = test_config();
    let service = service::<TestEngine>(&config);

    call(&service, put("multi", b"x", b"1"));
    call(&service, put("multi", b"z", b"3"));

    let keys = vec![b"x".to_vec(), b"y".to_vec(), b"z".to_vec()];
    let responses = call(&service, stream("multi", Query::Keys(keys)));

    assert_eq!(responses.len(), 3);
    assert!(matches!(&responses[0], Response::Item(i) if i.key == b"x" && i.error.is_empty()));
    assert!(matches!(&responses[1], Response::Item(i) if i.key == b"z" && !i.error.is_empty()));
    assert_eq!(responses[2], Response::End);
}

#[test]
fn test_iterator_fault_becomes_internal_status() {
    let (_temp, config) = test_config();
    let service = service::<TestEngine>(&config);

    for key in ["c1", "c2", "corrupt3"] {
        call(&service, put("faulty", key.as_bytes(), b"v"));
    }

    let responses = call(&service, stream("faulty", Query::Prefix(b"c".to_vec())));

    assert_eq!(responses.len(), 3);
    assert!(matches!(&responses[0], Response::Item(i) if i.key == b"c1"));
    assert!(matches!(&responses[1], Response::Item(i) if i.key == b"c2"));
    match &responses[2] {
        Response::Status(status) => {
            assert_eq!(status.code, StatusCode::Internal);
            assert!(status.message.starts_with("stream error:"));
        }
        other => panic!("expected status, got {:?}", other),
    }
}

#[test]
fn test_item_frame_conversion() {
    let frame = KvService::<tenantkv::LsmEngine>::item_frame(tenantkv::ResultItem::Error {
        key: b"k".to_vec(),
        message: "boom".to_string(),
    })
    .unwrap();
    assert_eq!(frame.key, b"k");
    assert_eq!(frame.error, "boom");

    let status = KvService::<tenantkv::LsmEngine>::item_frame(tenantkv::ResultItem::Fault {
        message: "bad block".to_string(),
    })
    .unwrap_err();
    assert_eq!(status, RpcStatus::internal("stream error: bad block"));
}

#[test]
fn test_sink_failure_cancels_stream() {
    let (_temp, config) = test_config();
    let service = service::<tenantkv::LsmEngine>(&config);

    for i in 0..50 {
        call(&service, put("big", format!("k{:02}", i).as_bytes(), b"v"));
    }

    let mut sink = FailingSink {
        remaining: 2,
        received: Vec::new(),
    };
    let result = service.dispatch(
        RequestEnvelope::new(stream("big", Query::Prefix(b"k".to_vec()))),
        Instant::now(),
        &mut sink,
    );

    assert!(matches!(result, Err(TenantError::StreamTransport(_))));
    assert_eq!(sink.received.len(), 2);
}

#[test]
fn test_slow_consumer_receives_whole_stream() {
    let (_temp, mut config) = test_config();
    config.stream_buffer = 1;
    let service = service::<tenantkv::LsmEngine>(&config);

    for i in 0..5 {
        call(&service, put("slow", format!("a{}", i).as_bytes(), b"v"));
    }

    let mut sink = SlowSink {
        delay: Duration::from_millis(60),
        received: Vec::new(),
    };
    service
        .dispatch(
            RequestEnvelope::new(stream("slow", Query::Prefix(b"a".to_vec()))),
            Instant::now(),
            &mut sink,
        )
        .unwrap();

    let items = sink
        .received
        .iter()
        .filter(|r| matches!(r, Response::Item(_)))
        .count();
    assert_eq!(items, 5);
    assert_eq!(sink.received.last(), Some(&Response::End));
}

// =============================================================================
// Deadline Tests
// =============================================================================

#[test]
fn test_expired_deadline() {
    let (_temp, config) = test_config();
    let service = service::<tenantkv::LsmEngine>(&config);
    let received = Instant::now().checked_sub(Duration::from_millis(50)).unwrap();

    for request in [get("users", b"k"), stream("users", Query::Prefix(Vec::new()))] {
        let mut sink = Vec::new();
        service
            .dispatch(RequestEnvelope::with_timeout(request, 10), received, &mut sink)
            .unwrap();
        assert_eq!(status_code(&sink), Some(StatusCode::DeadlineExceeded));
    }
}

#[test]
fn test_generous_deadline_is_met() {
    let (_temp, config) = test_config();
    let service = service::<tenantkv::LsmEngine>(&config);
    call(&service, put("users", b"k", b"v"));

    let mut sink = Vec::new();
    service
        .dispatch(
            RequestEnvelope::with_timeout(get("users", b"k"), 60_000),
            Instant::now(),
            &mut sink,
        )
        .unwrap();
    assert!(matches!(&sink[..], [Response::Get(r)] if r.found));
}
