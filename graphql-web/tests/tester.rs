use std::time::Duration;

use futures::StreamExt;
use graphql_web::Configuration;
use graphql_web::GraphQlTester;
use graphql_web::graphql::ErrorClassification;
use graphql_web::make_axum_router;
use serde::Deserialize;

mod common;

const RELEASES: &str = r#"query releases($slug: String!) {
    project(slug: $slug) { name releases { version } }
}"#;

#[derive(Debug, Deserialize, PartialEq)]
struct Release {
    version: String,
}

fn direct_tester() -> GraphQlTester {
    GraphQlTester::builder(common::handler()).build()
}

fn http_tester() -> GraphQlTester {
    let router = make_axum_router(common::handler(), &Configuration::default());
    GraphQlTester::http_builder(router)
        .response_timeout(Duration::from_secs(10))
        .build()
}

#[tokio::test]
async fn queries_through_both_strategies() {
    for tester in [direct_tester(), http_tester()] {
        let response = tester
            .query(RELEASES)
            .operation_name("releases")
            .variable("slug", "spring-framework")
            .execute()
            .await;
        response
            .path("project.name")
            .entity::<String>()
            .is_equal_to("Spring Framework");
        response
            .path("project.releases[*].version")
            .entity_list::<String>()
            .has_size_greater_than(1)
            .contains(&["6.1.0"]);
        let releases = response
            .path("project.releases")
            .entity_list::<Release>()
            .get();
        assert_eq!(releases[1].version, "6.0.9");
    }
}

#[tokio::test]
async fn execute_and_verify_accepts_clean_responses() {
    direct_tester()
        .query("{ project(slug: \"spring-framework\") { slug } }")
        .execute_and_verify()
        .await;
}

#[tokio::test]
async fn errors_are_filtered_by_path() {
    for tester in [direct_tester(), http_tester()] {
        tester
            .query("{ project(slug: \"missing\") { name } }")
            .execute()
            .await
            .errors()
            .filter(|error| error.json_path() == "$.project")
            .satisfy(|errors| {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].message, "No project named missing");
                assert_eq!(errors[0].classification(), ErrorClassification::NotFound);
            })
            .path("project")
            .value_does_not_exist();
    }
}

#[tokio::test]
#[should_panic(expected = "Response has 1 unexpected error(s)")]
async fn unexpected_errors_fail_the_test() {
    direct_tester()
        .query("{ project(slug: \"missing\") { name } }")
        .execute()
        .await
        .path("project");
}

#[tokio::test]
#[should_panic(expected = "Request: Query='{ whoami }'")]
async fn failures_describe_the_request() {
    direct_tester()
        .query("{ whoami }")
        .execute()
        .await
        .path("whoami")
        .value_exists();
}

#[tokio::test]
async fn subscriptions_through_both_strategies() {
    for tester in [direct_tester(), http_tester()] {
        let greetings: Vec<String> = tester
            .query("subscription { greetings }")
            .execute_subscription()
            .await
            .into_stream()
            .map(|response| response.path("greetings").entity::<String>().get())
            .collect()
            .await;
        assert_eq!(greetings, vec!["Hi", "Bonjour", "Hola"]);
    }
}

#[tokio::test]
async fn http_tester_posts_to_the_configured_path() {
    let configuration = Configuration::builder()
        .http(graphql_web::configuration::Http::builder().path("/api/graphql").build())
        .build();
    let router = make_axum_router(common::handler(), &configuration);
    GraphQlTester::http_builder(router)
        .url_path("/api/graphql")
        .build()
        .query("{ project(slug: \"spring-framework\") { releases { version } } }")
        .execute()
        .await
        .path("project.releases")
        .matches_json(r#"[{ "version": "6.0.9" }, { "version": "6.1.0" }]"#);
}

#[tokio::test]
#[should_panic(expected = "Status expected:<200 OK> but was:<404 Not Found>")]
async fn http_tester_checks_the_status() {
    let router = make_axum_router(common::handler(), &Configuration::default());
    GraphQlTester::http_builder(router)
        .url_path("/elsewhere")
        .build()
        .query("{ whoami }")
        .execute()
        .await;
}
