use aspectra::pointcut::{MatchContext, Pointcut};
use aspectra::{ClassMetadata, MethodMetadata, PointcutSpec};
use proptest::prelude::*;

fn evaluate(spec: &PointcutSpec, service_id: &str, tags: &[String]) -> bool {
    let class = ClassMetadata::new("app::Service").with_method(MethodMetadata::new("run"));
    let method = MethodMetadata::new("run");
    let parents = class.ancestors();
    let ctx = MatchContext {
        class: &class,
        method: &method,
        service_id,
        service_tags: tags,
        parent_classes: &parents,
    };
    Pointcut::compile(&spec.statement())
        .and_then(|pointcut| pointcut.matches(&ctx))
        .unwrap()
}

fn service_id() -> impl Strategy<Value = String> {
    "[a-z.'\\\\]{0,12}"
}

proptest! {
    #[test]
    fn prefix_wildcard_matches_starts_with(id in service_id(), prefix in "[a-z.']{1,4}") {
        let spec = PointcutSpec::ServiceIds(vec![format!("{}*", prefix)]);
        prop_assert_eq!(evaluate(&spec, &id, &[]), id.starts_with(&prefix));
    }

    #[test]
    fn suffix_wildcard_matches_ends_with(id in service_id(), suffix in "[a-z.\\\\]{1,4}") {
        let spec = PointcutSpec::ServiceIds(vec![format!("*{}", suffix)]);
        prop_assert_eq!(evaluate(&spec, &id, &[]), id.ends_with(&suffix));
    }

    #[test]
    fn exact_ids_match_only_themselves(id in service_id(), ids in prop::collection::vec(service_id(), 0..4)) {
        let ids: Vec<String> = ids.into_iter().filter(|i| !i.contains('*')).collect();
        let spec = PointcutSpec::ServiceIds(ids.clone());
        prop_assert_eq!(evaluate(&spec, &id, &[]), ids.contains(&id));
    }

    #[test]
    fn tags_match_any_membership(
        tags in prop::collection::vec("[a-z]{1,3}", 0..4),
        wanted in prop::collection::vec("[a-z]{1,3}", 0..3),
    ) {
        let spec = PointcutSpec::ServiceTags(wanted.clone());
        let expected = wanted.iter().any(|w| tags.contains(w));
        prop_assert_eq!(evaluate(&spec, "svc", &tags), expected);
    }
}
