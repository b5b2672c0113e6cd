//! 链接校验的可达性检查：用 wiremock 提供可达 / 不可达 / 重定向的地址

use std::sync::Arc;

use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use questionnaire::core::{AgentSpec, CandidateAnswer, Verdict};
use questionnaire::llm::{CallKind, MockAgentsApi};
use questionnaire::stages::{LinkChecker, LinkPolicy, LinkProbe, LinkValidator};

const LINK_CHECKER: &str = "link-checker";

async fn link_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/moved"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("location", format!("{}/ok", server.uri())),
        )
        .mount(&server)
        .await;
    server
}

fn checker(mock: &Arc<MockAgentsApi>) -> LinkChecker {
    LinkChecker::new(mock.clone(), AgentSpec::new("gpt-4.1", LINK_CHECKER)).with_policy(
        LinkPolicy {
            require_links: false,
            probe: Some(LinkProbe::new(5)),
        },
    )
}

#[tokio::test]
async fn test_only_reachable_links_reach_the_agent() {
    let server = link_server().await;
    let uri = server.uri();
    let mock = Arc::new(MockAgentsApi::new().with_replies(LINK_CHECKER, ["VALID"]));

    let candidate = CandidateAnswer::new(format!(
        "Rayleigh scattering, see {uri}/ok and {uri}/gone and {uri}/moved."
    ));
    let verdict = checker(&mock).validate_links(&candidate).await.unwrap();
    assert_eq!(verdict, Verdict::Accepted);

    let prompts = mock.prompts_for(LINK_CHECKER);
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains(&format!("- {}/ok\n", uri)));
    assert!(prompts[0].contains(&format!("- {}/moved\n", uri)));
    // 答案预览里仍有 /gone，只检查列表行
    assert!(!prompts[0].contains(&format!("- {}/gone", uri)));
    assert_eq!(mock.live_resources(), 0);
}

#[tokio::test]
async fn test_all_unreachable_rejects_without_session() {
    let server = link_server().await;
    let uri = server.uri();
    let mock = Arc::new(MockAgentsApi::new().with_default_reply(LINK_CHECKER, "VALID"));

    let candidate = CandidateAnswer::new(format!("Source: {uri}/gone"));
    let verdict = checker(&mock).validate_links(&candidate).await.unwrap();

    match verdict {
        Verdict::Rejected(reason) => {
            assert!(reason.starts_with("no reachable links"), "{reason}");
            assert!(reason.contains("HTTP 404"), "{reason}");
        }
        other => panic!("unexpected verdict: {:?}", other),
    }
    assert_eq!(mock.count(CallKind::CreateAgent), 0);
    assert!(mock.prompts_for(LINK_CHECKER).is_empty());
}

#[tokio::test]
async fn test_citation_links_are_checked_too() {
    let server = link_server().await;
    let uri = server.uri();
    let mock = Arc::new(MockAgentsApi::new().with_replies(LINK_CHECKER, ["VALID"]));

    let candidate = CandidateAnswer::new("Sunlight is scattered by air molecules.")
        .with_citations(vec![format!("{uri}/gone"), format!("{uri}/ok")]);
    let verdict = checker(&mock).validate_links(&candidate).await.unwrap();
    assert_eq!(verdict, Verdict::Accepted);

    let prompt = &mock.prompts_for(LINK_CHECKER)[0];
    assert!(prompt.contains(&format!("- {}/ok\n", uri)));
    assert!(!prompt.contains("/gone"));
}
