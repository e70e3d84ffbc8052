use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use gnss_archive_fetcher::archive::{
    ArchiveTransport, AttemptOutcome, Credential, EarthscopeHttpClient, FetchFailure, Fetcher,
    RetryPolicy,
};
use gnss_archive_fetcher::candidates::Candidate;
use gnss_archive_fetcher::catalog::{BoundingBox, StationCatalog, UnavcoCatalogClient};
use gnss_archive_fetcher::domain::parse_date;
use gnss_archive_fetcher::error::FetchError;
use gnss_archive_fetcher::progress::NullSink;

/// Serves one canned response per connection and hands back each request head.
fn serve(responses: Vec<String>) -> (String, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for response in responses {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut head = String::new();
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                    break;
                }
                head.push_str(&line);
            }
            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();
            let _ = tx.send(head);
        }
    });
    (base, rx)
}

fn response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

fn client() -> EarthscopeHttpClient {
    EarthscopeHttpClient::new(&Credential::new("s3cret"), Duration::from_secs(5)).unwrap()
}

fn destination(temp: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().join("2021/152/abcd1520.21d.Z")).unwrap()
}

#[test]
fn ok_response_is_written_with_bearer_token() {
    let (base, requests) = serve(vec![response("200 OK", "compressed-rinex")]);
    let temp = tempfile::tempdir().unwrap();
    let dest = destination(&temp);

    let outcome = client()
        .attempt(&format!("{base}/2021/152/abcd1520.21d.Z"), &dest)
        .unwrap();

    assert_eq!(outcome, AttemptOutcome::Written { bytes: 16 });
    assert_eq!(std::fs::read(&dest).unwrap(), b"compressed-rinex");
    let head = requests.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(head.starts_with("GET /2021/152/abcd1520.21d.Z HTTP/1.1"));
    let lower = head.to_lowercase();
    assert!(lower.contains("authorization: bearer s3cret"));
    assert!(lower.contains("user-agent: gnss-fetch/"));
}

#[test]
fn missing_file_writes_nothing() {
    let (base, _requests) = serve(vec![response("404 Not Found", "no such file")]);
    let temp = tempfile::tempdir().unwrap();
    let dest = destination(&temp);

    let outcome = client().attempt(&format!("{base}/x"), &dest).unwrap();

    assert_eq!(outcome, AttemptOutcome::Status(404));
    assert!(!dest.as_std_path().exists());
}

#[test]
fn empty_ok_body_is_retried_and_never_kept() {
    let (base, requests) = serve(vec![response("200 OK", ""), response("200 OK", "")]);
    let temp = tempfile::tempdir().unwrap();
    let candidate = Candidate {
        url: format!("{base}/2021/152/abcd1520.21d.Z"),
        path: destination(&temp),
    };
    let fetcher = Fetcher::new(
        client(),
        RetryPolicy {
            max_attempts: 2,
            delay: Duration::ZERO,
        },
    );

    let err = fetcher.fetch(&candidate, &NullSink).unwrap_err();

    assert_matches!(
        err,
        FetchFailure::Transport { ref message, attempts: 2 } if message == "empty response body"
    );
    assert!(!candidate.path.as_std_path().exists());
    assert!(requests.recv_timeout(Duration::from_secs(5)).is_ok());
    assert!(requests.recv_timeout(Duration::from_secs(5)).is_ok());
}

#[test]
fn server_error_status_is_reported() {
    let (base, _requests) = serve(vec![response("503 Service Unavailable", "")]);
    let temp = tempfile::tempdir().unwrap();
    let dest = destination(&temp);

    let outcome = client().attempt(&format!("{base}/x"), &dest).unwrap();

    assert_eq!(outcome, AttemptOutcome::Status(503));
    assert!(!dest.as_std_path().exists());
}

#[test]
fn refused_connection_is_a_transport_failure() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let temp = tempfile::tempdir().unwrap();

    let outcome = client()
        .attempt(&format!("http://127.0.0.1:{port}/x"), &destination(&temp))
        .unwrap();

    assert_matches!(outcome, AttemptOutcome::Transport(_));
}

#[test]
fn catalog_query_carries_bounding_box() {
    let body = r#"[
        {"id": "P123", "session_start_time": "2005-03-01T00:00:00Z", "session_stop_time": null},
        {"id": "AB12", "session_start_time": "2010-01-01", "session_stop_time": "2012-06-30"}
    ]"#;
    let (base, requests) = serve(vec![response("200 OK", body)]);
    let catalog = UnavcoCatalogClient::new(&format!("{base}/sites")).unwrap();
    let bbox = BoundingBox::new(32.5, 33.0, -117.0, -116.5).unwrap();

    let stations = catalog.stations_in(&bbox).unwrap();

    assert_eq!(stations.len(), 2);
    assert_eq!(stations[0].id.as_str(), "P123");
    assert_eq!(
        stations[0].operational_start,
        Some(parse_date("2005-03-01").unwrap())
    );
    assert_eq!(stations[0].operational_stop, None);
    assert_eq!(
        stations[1].operational_stop,
        Some(parse_date("2012-06-30").unwrap())
    );
    let head = requests.recv_timeout(Duration::from_secs(5)).unwrap();
    let request_line = head.lines().next().unwrap();
    assert!(request_line.starts_with("GET /sites?"));
    assert!(request_line.contains("minlatitude=32.5"));
    assert!(request_line.contains("maxlongitude=-116.5"));
}

#[test]
fn catalog_client_error_is_not_retried() {
    let (base, requests) = serve(vec![response("400 Bad Request", "bad box")]);
    let catalog = UnavcoCatalogClient::new(&base).unwrap();
    let bbox = BoundingBox::new(0.0, 1.0, 0.0, 1.0).unwrap();

    let err = catalog.stations_in(&bbox).unwrap_err();

    assert_matches!(err, FetchError::CatalogStatus { status: 400, ref message } if message == "bad box");
    assert!(requests.recv_timeout(Duration::from_secs(5)).is_ok());
    assert!(requests.recv_timeout(Duration::from_millis(300)).is_err());
}
