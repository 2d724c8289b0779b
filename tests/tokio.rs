use reqwest::Client;
use requestmatcher::{MockServer, RequestMatchers, ResponseTemplate};

// Each mock server drives its own runtime: it must work from both a
// single-threaded and a multi-threaded test runtime.

async fn hello_reqwest() {
    let mock_server = MockServer::start().await;

    mock_server.add_response(
        ResponseTemplate::new(200),
        RequestMatchers::new().method_is("GET").path_is("/"),
    );

    let resp = Client::new().get(&mock_server.uri()).send().await.unwrap();

    assert_eq!(resp.status(), 200);
    assert!(mock_server.finish(Ok::<(), String>(())).is_ok());
}

#[tokio::test]
async fn hello_reqwest_current_thread() {
    hello_reqwest().await
}

#[tokio::test(flavor = "multi_thread")]
async fn hello_reqwest_multi_thread() {
    hello_reqwest().await
}

#[tokio::test]
async fn a_dedicated_server_listens_where_it_is_told() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();

    let mock_server = MockServer::builder().listener(listener).start().await;

    assert_eq!(mock_server.address(), &address);
    assert!(mock_server.finish(Ok::<(), String>(())).is_ok());
}
