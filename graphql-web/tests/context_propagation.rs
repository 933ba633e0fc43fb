use std::sync::Arc;

use graphql_web::DataFetcherError;
use graphql_web::ExceptionResolverAdapter;
use graphql_web::ExceptionResolvers;
use graphql_web::FieldEnvironment;
use graphql_web::GraphQlTester;
use graphql_web::WebInput;
use graphql_web::graphql::ErrorClassification;
use graphql_web::services::ResponseBody;
use parking_lot::Mutex;
use serde_json_bytes::json;

mod common;

fn whoami() -> WebInput {
    WebInput::fake_builder().query("{ whoami }").build().unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn resolvers_see_the_callers_principal_on_other_threads() {
    let handler = common::handler();
    common::set_principal(Some("rossen"));
    let pending = handler.handle(whoami());
    common::set_principal(None);

    let response = tokio::spawn(pending).await.unwrap().unwrap();
    let ResponseBody::Single(response) = response.body else {
        panic!("expected a single response");
    };
    assert_eq!(response.data, Some(json!({ "whoami": "rossen" })));
    assert_eq!(common::principal(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn resolution_is_cleared_after_each_request() {
    let handler = common::handler();

    common::set_principal(Some("juergen"));
    let first = handler.handle(whoami());
    common::set_principal(None);
    let second = handler.handle(whoami());

    let first = tokio::spawn(first).await.unwrap().unwrap();
    let second = tokio::spawn(second).await.unwrap().unwrap();
    assert_eq!(
        first.body.first_response().await.unwrap().data,
        Some(json!({ "whoami": "juergen" }))
    );
    assert_eq!(
        second.body.first_response().await.unwrap().data,
        Some(json!({ "whoami": null }))
    );
}

#[tokio::test]
async fn resolvers_see_the_callers_principal_on_the_same_thread() {
    let handler = common::handler();
    common::set_principal(Some("rossen"));
    let pending = handler.handle(whoami());
    common::set_principal(None);

    let response = tokio::spawn(pending).await.unwrap().unwrap();
    assert_eq!(
        response.body.first_response().await.unwrap().data,
        Some(json!({ "whoami": "rossen" }))
    );
    assert_eq!(common::principal(), None);
}

#[tokio::test]
async fn later_state_on_the_calling_thread_does_not_leak_into_the_request() {
    let handler = common::handler();
    common::set_principal(Some("alice"));
    let pending = handler.handle(whoami());
    common::set_principal(Some("mallory"));

    let response = pending.await.unwrap();
    assert_eq!(
        response.body.first_response().await.unwrap().data,
        Some(json!({ "whoami": "alice" }))
    );
    assert_eq!(common::principal().as_deref(), Some("mallory"));
    common::set_principal(None);
}

#[tokio::test]
async fn without_state_nothing_is_propagated() {
    GraphQlTester::builder(common::handler())
        .build()
        .query("{ whoami }")
        .execute()
        .await
        .path("whoami")
        .value_does_not_exist();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn exception_resolvers_see_the_callers_principal() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = seen.clone();
    let resolvers = ExceptionResolvers::new().resolver(ExceptionResolverAdapter::single_error(
        move |_: &DataFetcherError, env: &FieldEnvironment| {
            recorded
                .lock()
                .push((common::principal(), common::principal_of(env)));
            Some(env.error("Resolved", ErrorClassification::Forbidden))
        },
    ));
    let handler = common::handler_builder(resolvers)
        .thread_local_accessor(common::PrincipalAccessor)
        .build();

    common::set_principal(Some("brian"));
    let pending = handler.handle(
        WebInput::fake_builder()
            .query("{ project(slug: \"missing\") { name } }")
            .build()
            .unwrap(),
    );
    common::set_principal(None);
    let response = tokio::spawn(pending).await.unwrap().unwrap();
    let response = response.body.first_response().await.unwrap();

    assert_eq!(response.errors[0].message, "Resolved");
    assert_eq!(
        *seen.lock(),
        vec![(Some("brian".to_string()), Some("brian".to_string()))]
    );
}
