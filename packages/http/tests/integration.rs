use std::time::Duration;

use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hopline_client::{AggregateStatus, ClientConfig, FileSystem};
use hopline_wire::{Error, OpenFlags, Status};

/// Must run on a blocking thread: the HTTP client is a blocking one.
fn connect(host: &str, config: ClientConfig) -> FileSystem {
    hopline_http::connect(host, config).unwrap()
}

#[tokio::test]
async fn test_stat_follows_redirect_across_servers() {
    let redirector = MockServer::start().await;
    let data_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/data/f"))
        .respond_with(
            ResponseTemplate::new(307)
                .insert_header("location", format!("{}/data/f?tried=s1", data_server.uri())),
        )
        .expect(1)
        .mount(&redirector)
        .await;

    Mock::given(method("POST"))
        .and(path("/data/f"))
        .and(header("x-hopline-op", "stat"))
        .and(query_param("tried", "s1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("7 1024 2 1700000000"))
        .expect(1)
        .mount(&data_server)
        .await;

    let host = redirector.address().to_string();
    let config = ClientConfig::default();
    let expected_hosts = vec![
        redirector.address().to_string(),
        data_server.address().to_string(),
    ];

    let response = tokio::task::spawn_blocking(move || connect(&host, config).stat("/data/f"))
        .await
        .unwrap();

    assert_eq!(response.status, Status::Ok);
    assert_eq!(response.host_names(), expected_hosts);
    let stat = response.payload.unwrap();
    assert_eq!(stat.size, 1024);
    assert!(stat.is_dir());
}

#[tokio::test]
async fn test_append_mode_accumulates_cgi() {
    let redirector = MockServer::start().await;
    let data_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", format!("{}/f?tried=s1", data_server.uri()))
                .insert_header("x-hopline-cgi", "append"),
        )
        .mount(&redirector)
        .await;

    Mock::given(method("POST"))
        .and(query_param("tried", "s0,s1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&data_server)
        .await;

    let host = redirector.address().to_string();
    let config = ClientConfig::default();
    let response = tokio::task::spawn_blocking(move || connect(&host, config).rm("/f?tried=s0"))
        .await
        .unwrap();

    assert!(response.status.is_ok(), "{:?}", response.status);
}

#[tokio::test]
async fn test_redirect_is_returned_when_not_following() {
    let redirector = MockServer::start().await;
    let data_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(307)
                .insert_header("location", format!("{}/moved?tok=a%26b", data_server.uri())),
        )
        .expect(1)
        .mount(&redirector)
        .await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&data_server)
        .await;

    let host = redirector.address().to_string();
    let config = ClientConfig::default().with_follow_redirects(false);
    let data_host = data_server.address().to_string();

    let response = tokio::task::spawn_blocking(move || connect(&host, config).stat("/f"))
        .await
        .unwrap();

    assert_eq!(
        response.status.error(),
        Some(&Error::Redirected {
            host: data_host.clone(),
            target: "/moved?tok=a%26b".to_string(),
        })
    );
    assert_eq!(response.hosts.len(), 2);
    assert_eq!(response.hosts[1].host, data_host);
}

#[tokio::test]
async fn test_server_error_keeps_status_and_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such file\n"))
        .mount(&server)
        .await;

    let host = server.address().to_string();
    let config = ClientConfig::default();
    let response = tokio::task::spawn_blocking(move || connect(&host, config).stat("/missing"))
        .await
        .unwrap();

    assert_eq!(
        response.status.error(),
        Some(&Error::Server {
            code: 404,
            message: "no such file".to_string()
        })
    );
    assert!(response.payload.is_none());
}

#[tokio::test]
async fn test_partial_header_marks_partial_reply() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(header("x-hopline-op", "locate"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-hopline-partial", "1")
                .set_body_string("Sr10.0.0.1:1094"),
        )
        .mount(&server)
        .await;

    let host = server.address().to_string();
    let config = ClientConfig::default();
    let response = tokio::task::spawn_blocking(move || {
        connect(&host, config).locate("/f", OpenFlags::NONE)
    })
    .await
    .unwrap();

    assert!(response.status.is_partial());
    let locations = response.payload.unwrap();
    assert_eq!(locations.len(), 1);
    assert_eq!(locations.locations[0].address, "10.0.0.1:1094");
}

#[tokio::test]
async fn test_redirect_loop_hits_limit() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(307).insert_header("location", format!("{}/loop", server.uri())),
        )
        .expect(4)
        .mount(&server)
        .await;

    let host = server.address().to_string();
    let config = ClientConfig::default().with_redirect_limit(3);
    let response = tokio::task::spawn_blocking(move || connect(&host, config).stat("/start"))
        .await
        .unwrap();

    assert_eq!(
        response.status.error(),
        Some(&Error::RedirectLimitExceeded { limit: 3 })
    );
    assert_eq!(response.hosts.len(), 4);
    assert_eq!(response.hosts[0].path, "/start");
    assert_eq!(response.hosts[3].path, "/loop");
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(800)))
        .mount(&server)
        .await;

    let host = server.address().to_string();
    let config = ClientConfig::default().with_request_timeout(Duration::from_millis(100));
    let response = tokio::task::spawn_blocking(move || connect(&host, config).ping())
        .await
        .unwrap();

    assert!(response.status.error().is_some_and(Error::is_timeout));
}

#[tokio::test]
async fn test_rm_many_reports_each_path() {
    let server = MockServer::start().await;

    for (file, code) in [("/a", 200), ("/b", 404), ("/c", 200)] {
        Mock::given(method("POST"))
            .and(path(file))
            .and(header("x-hopline-op", "rm"))
            .respond_with(ResponseTemplate::new(code))
            .mount(&server)
            .await;
    }

    let host = server.address().to_string();
    let config = ClientConfig::default();
    let (partial, failed) = tokio::task::spawn_blocking(move || {
        let fs = connect(&host, config);
        (
            fs.rm_many(&["/a", "/b", "/c"], 2).unwrap(),
            fs.rm_many(&["/a", "/b", "/c"], 3).unwrap(),
        )
    })
    .await
    .unwrap();

    assert_eq!(partial.status, AggregateStatus::Partial);
    let failures: Vec<usize> = partial.failures().map(|(i, _)| i).collect();
    assert_eq!(failures, vec![1]);

    assert_eq!(failed.status, AggregateStatus::Error);
    assert!(failed.responses[0].status.is_ok());
    assert!(failed.responses[2].status.is_ok());
    assert!(matches!(
        failed.responses[1].status.error(),
        Some(Error::Server { code: 404, .. })
    ));
}

#[tokio::test]
async fn test_unreachable_host_is_a_connection_failure() {
    let response =
        tokio::task::spawn_blocking(|| connect("127.0.0.1:1", ClientConfig::default()).ping())
            .await
            .unwrap();

    match response.status.error() {
        Some(Error::TransportFailure { .. }) => {}
        other => panic!("expected a transport failure, got {:?}", other),
    }
}
