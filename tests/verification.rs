use reqwest::Client;
use requestmatcher::{Failure, MatchError, MockServer, RequestMatchers, ResponseTemplate};

#[async_std::test]
async fn unused_expectations_fail_the_session() {
    // Arrange
    let mock_server = MockServer::start().await;
    mock_server.add_response(
        ResponseTemplate::new(200),
        RequestMatchers::new().method_is("GET").path_is("/never"),
    );

    // Act
    let failure = mock_server.finish(Ok::<(), String>(())).unwrap_err();

    // Assert
    let message = failure.to_string();
    assert!(message.contains("unused"), "{}", message);
    assert!(message.contains("path: is \"/never\""), "{}", message);
    assert!(
        message.contains("The server did not receive any request."),
        "{}",
        message
    );
}

#[async_std::test]
async fn received_requests_are_listed_next_to_unused_expectations() {
    // Arrange
    let mock_server = MockServer::start().await;
    mock_server.add_response(ResponseTemplate::new(200), RequestMatchers::new().path_is("/a"));
    mock_server.add_response(ResponseTemplate::new(200), RequestMatchers::new().path_is("/b"));

    // Act
    reqwest::get(format!("{}/a", mock_server.uri())).await.unwrap();

    // Assert
    let message = mock_server
        .finish(Ok::<(), String>(()))
        .unwrap_err()
        .to_string();
    assert!(message.contains("Received requests:\n- Request #1\n\t> GET /a"), "{}", message);
}

#[async_std::test]
async fn without_recording_the_report_suggests_enabling_it() {
    // Arrange
    let mock_server = MockServer::builder()
        .disable_request_recording()
        .start()
        .await;
    mock_server.add_response(ResponseTemplate::new(200), RequestMatchers::new().path_is("/a"));

    // Act
    let message = mock_server
        .finish(Ok::<(), String>(()))
        .unwrap_err()
        .to_string();

    // Assert
    assert!(mock_server.received_requests().is_none());
    assert!(message.contains("Enable request recording"), "{}", message);
}

#[async_std::test]
async fn the_test_error_is_handed_back_when_matching_went_fine() {
    // Arrange
    let mock_server = MockServer::start().await;

    // Act
    let failure = mock_server.finish(Err("boom")).unwrap_err();

    // Assert
    match failure {
        Failure::Test(e) => assert_eq!(e, "boom"),
        Failure::Matching(e) => panic!("Unexpected matching failure: {}", e),
    }
}

#[async_std::test]
async fn a_matching_failure_dominates_the_test_error() {
    // Arrange - nothing pending, the request cannot be matched.
    let mock_server = MockServer::start().await;
    let _ = Client::new()
        .delete(format!("{}/resource", mock_server.uri()))
        .send()
        .await;

    // Act
    let failure = mock_server.finish(Err("boom")).unwrap_err();

    // Assert
    match failure.matching() {
        Some(MatchError::NoMatch(report)) => {
            assert!(report.candidates().is_empty());
            assert_eq!(report.order(), 1);
            assert!(report.request().starts_with("> DELETE /resource"));
        }
        other => panic!("Unexpected failure: {:?}", other),
    }
}

#[async_std::test]
async fn a_session_can_only_be_finished_once() {
    // Arrange
    let mock_server = MockServer::start().await;
    assert!(mock_server.finish(Ok::<(), String>(())).is_ok());

    // Act
    let second = mock_server.finish(Ok::<(), String>(()));

    // Assert
    assert!(matches!(
        second,
        Err(Failure::Matching(MatchError::Finalized))
    ));
}

#[async_std::test]
async fn requests_after_finish_are_refused() {
    // Arrange
    let mock_server = MockServer::start().await;
    mock_server.add_response(ResponseTemplate::new(200), RequestMatchers::new());
    let _ = mock_server.finish(Ok::<(), String>(()));

    // Act
    let outcome = reqwest::get(&mock_server.uri()).await;

    // Assert
    assert!(outcome.is_err());
}

#[async_std::test]
#[should_panic(expected = "The session has already been finalized")]
async fn registering_after_finish_is_refused() {
    // Arrange
    let mock_server = MockServer::start().await;
    assert!(mock_server.finish(Ok::<(), String>(())).is_ok());

    // Act
    mock_server.add_response(ResponseTemplate::new(200), RequestMatchers::new().path_is("/late"));
}

#[async_std::test]
async fn reset_starts_a_fresh_session() {
    // Arrange
    let mock_server = MockServer::start().await;
    mock_server.add_response(ResponseTemplate::new(200), RequestMatchers::new().path_is("/a"));
    let _ = reqwest::get(format!("{}/unexpected", mock_server.uri())).await;

    // Act
    mock_server.reset();

    // Assert
    assert_eq!(mock_server.pending(), 0);
    assert_eq!(mock_server.received_requests().unwrap().len(), 0);
    assert!(mock_server.finish(Ok::<(), String>(())).is_ok());
}

#[async_std::test]
async fn verify_passes_once_every_expectation_is_claimed() {
    // Arrange
    let mock_server = MockServer::start().await;
    mock_server.add_response(ResponseTemplate::new(200), RequestMatchers::new().method_is("GET"));

    // Act
    reqwest::get(&mock_server.uri()).await.unwrap();

    // Assert
    mock_server.verify();
}

#[async_std::test]
#[should_panic(expected = "There are unused expectations")]
async fn dropping_the_server_verifies_the_session() {
    // Arrange
    let mock_server = MockServer::start().await;
    mock_server.add_response(ResponseTemplate::new(200), RequestMatchers::new().method_is("GET"));

    // Act - we never send the request
}

#[async_std::test]
#[should_panic(expected = "the assertion in the test body failed")]
async fn a_panicking_test_is_not_masked_by_the_drop_verification() {
    // Arrange
    let mock_server = MockServer::start().await;
    mock_server.add_response(ResponseTemplate::new(200), RequestMatchers::new());

    // Act
    panic!("the assertion in the test body failed");
}
