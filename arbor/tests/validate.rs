//! Tests for validation passes.

mod common;

use arbor::{
    AlwaysTrue, DataTree, Diagnostics, DiffOptions, Error, ValidationKind, ValidationMode,
    ValidationOptions, Validity, diff, validate,
};
use common::{node, schema, tree, value, when_eq};

fn run(tree: &mut DataTree, mode: ValidationMode) -> Result<(), Error> {
    common::init_tracing();
    let mut diag = Diagnostics::new();
    validate(tree, &ValidationOptions::new(mode), &when_eq, &mut diag)
}

fn failure(result: Result<(), Error>) -> (ValidationKind, String) {
    let err = result.unwrap_err();
    let v = err
        .as_validation()
        .unwrap_or_else(|| panic!("expected a validation error, got {err}"));
    (v.kind.clone(), v.path.clone())
}

#[test]
fn test_defaults_synthesised() {
    let ctx = schema();
    let mut t = DataTree::new(ctx);
    run(&mut t, ValidationMode::Data).unwrap();

    assert_eq!(value(&t, "/net:limits/mode"), Some("auto"));
    assert_eq!(value(&t, "/net:dns/search[.='local']"), Some("local"));
    // mandatory leaf satisfied by its default; the container stays default
    let limits = node(&t, "/net:limits");
    assert!(t.is_default(limits));
    assert!(t.is_default(node(&t, "/net:limits/mode")));
    // containers that would stay empty are not created
    assert_eq!(t.find_path("/net:interfaces").unwrap(), None);
    assert_eq!(t.find_path("/net:stats").unwrap(), None);
}

#[test]
fn test_validation_is_idempotent() {
    let ctx = schema();
    let mut t = tree(
        &ctx,
        &[
            ("/net:interfaces/interface[name='eth0']/type", Some("ethernet")),
            ("/net:interfaces/interface[name='lo']/type", Some("loopback")),
            ("/net:owner", Some("eth0")),
        ],
    );
    run(&mut t, ValidationMode::Data).unwrap();
    let once = t.clone();
    run(&mut t, ValidationMode::Data).unwrap();
    assert!(once.content_eq(&t));

    let mut diag = Diagnostics::new();
    let opts = DiffOptions {
        with_defaults: true,
    };
    assert!(diff(Some(&once), Some(&t), &opts, &mut diag).unwrap().is_empty());
    t.check_index_consistency().unwrap();
}

#[test]
fn test_explicit_content_clears_container_default() {
    let ctx = schema();
    let mut t = DataTree::new(ctx);
    run(&mut t, ValidationMode::Data).unwrap();
    let limits = node(&t, "/net:limits");
    let mode = node(&t, "/net:limits/mode");
    t.change_term(mode, "manual").unwrap();
    assert!(!t.is_default(mode));
    assert!(!t.is_default(limits));
}

#[test]
fn test_default_propagates_through_nested_containers() {
    let ctx = schema();
    let mut t = DataTree::new(ctx);
    run(&mut t, ValidationMode::Data).unwrap();
    let system = node(&t, "/net:system");
    let clock = node(&t, "/net:system/clock");
    assert_eq!(value(&t, "/net:system/clock/timezone"), Some("UTC"));
    assert!(t.is_default(system) && t.is_default(clock));

    let mut diag = Diagnostics::new();
    let source = t
        .new_path("/net:system/clock/source", Some("ntp"), &mut diag)
        .unwrap();
    assert!(!t.is_default(system) && !t.is_default(clock));

    t.remove(source).unwrap();
    assert!(t.is_default(system) && t.is_default(clock));
}

#[test]
fn test_when_false_removes_default_only() {
    let ctx = schema();
    let mut t = tree(
        &ctx,
        &[
            ("/net:interfaces/interface[name='eth0']/type", Some("ethernet")),
            ("/net:interfaces/interface[name='lo']/type", Some("loopback")),
        ],
    );
    run(&mut t, ValidationMode::Data).unwrap();
    assert_eq!(value(&t, "/net:interfaces/interface[name='eth0']/vlan"), Some("1"));
    assert_eq!(value(&t, "/net:interfaces/interface[name='lo']/vlan"), None);
    assert_eq!(value(&t, "/net:interfaces/interface[name='lo']/mtu"), Some("1500"));
}

#[test]
fn test_when_false_on_explicit_node() {
    let ctx = schema();
    let mut t = tree(
        &ctx,
        &[
            ("/net:interfaces/interface[name='lo']/type", Some("loopback")),
            ("/net:interfaces/interface[name='lo']/vlan", Some("7")),
        ],
    );
    let (kind, path) = failure(run(&mut t, ValidationMode::Data));
    assert!(matches!(kind, ValidationKind::WhenFalse { .. }));
    assert_eq!(path, "/net:interfaces/interface[name='lo']/vlan");
}

#[test]
fn test_when_evaluator_always_true() {
    let ctx = schema();
    let mut t = tree(
        &ctx,
        &[
            ("/net:interfaces/interface[name='lo']/type", Some("loopback")),
            ("/net:interfaces/interface[name='lo']/vlan", Some("7")),
        ],
    );
    let mut diag = Diagnostics::new();
    validate(&mut t, &ValidationOptions::default(), &AlwaysTrue, &mut diag).unwrap();
    assert!(diag.is_empty());
}

#[test]
fn test_missing_mandatory_leaf() {
    let ctx = schema();
    let mut t = tree(&ctx, &[("/net:interfaces/interface[name='eth1']", None)]);
    let mut diag = Diagnostics::new();
    let result = validate(
        &mut t,
        &ValidationOptions::default(),
        &when_eq,
        &mut diag,
    );
    let (kind, path) = failure(result);
    assert_eq!(
        kind,
        ValidationKind::MissingMandatory {
            name: "type".into()
        }
    );
    assert_eq!(path, "/net:interfaces/interface[name='eth1']");
    assert!(diag.has_errors());
}

#[test]
fn test_get_mode_skips_mandatory() {
    let ctx = schema();
    let mut t = tree(&ctx, &[("/net:interfaces/interface[name='eth1']", None)]);
    run(&mut t, ValidationMode::Get).unwrap();
}

#[test]
fn test_max_elements() {
    let ctx = schema();
    let mut t = tree(
        &ctx,
        &[
            ("/net:limits/peers[id='1']", None),
            ("/net:limits/peers[id='2']", None),
            ("/net:limits/peers[id='3']", None),
        ],
    );
    let (kind, path) = failure(run(&mut t, ValidationMode::Data));
    assert_eq!(
        kind,
        ValidationKind::TooMany {
            name: "peers".into(),
            max: 2,
            count: 3
        }
    );
    assert_eq!(path, "/net:limits/peers[id='3']");
}

#[test]
fn test_leafref_resolution() {
    let ctx = schema();
    let mut t = tree(
        &ctx,
        &[
            ("/net:interfaces/interface[name='eth0']/type", Some("ethernet")),
            ("/net:owner", Some("eth9")),
        ],
    );
    let (kind, path) = failure(run(&mut t, ValidationMode::Data));
    assert_eq!(
        kind,
        ValidationKind::UnresolvedReference {
            value: "eth9".into()
        }
    );
    assert_eq!(path, "/net:owner");

    let owner = node(&t, "/net:owner");
    t.change_term(owner, "eth0").unwrap();
    run(&mut t, ValidationMode::Data).unwrap();
    assert!(t.validity(owner).is_empty());
}

#[test]
fn test_unique_constraint() {
    let ctx = schema();
    let mut t = tree(
        &ctx,
        &[
            ("/net:interfaces/interface[name='eth0']/type", Some("ethernet")),
            ("/net:interfaces/interface[name='eth0']/ip", Some("10.0.0.1")),
            ("/net:interfaces/interface[name='eth1']/type", Some("ethernet")),
            ("/net:interfaces/interface[name='eth2']/type", Some("ethernet")),
        ],
    );
    // eth1 and eth2 have no ip and are exempt
    run(&mut t, ValidationMode::Data).unwrap();

    let mut diag = Diagnostics::new();
    t.new_path(
        "/net:interfaces/interface[name='eth2']/ip",
        Some("10.0.0.1"),
        &mut diag,
    )
    .unwrap();
    let (kind, path) = failure(run(&mut t, ValidationMode::Data));
    assert_eq!(
        kind,
        ValidationKind::NotUnique {
            leaves: "ip".into()
        }
    );
    assert_eq!(path, "/net:interfaces/interface[name='eth2']");
}

#[test]
fn test_state_data_in_config_mode() {
    let ctx = schema();
    let mut t = tree(&ctx, &[("/net:stats/seen[.='x']", None)]);
    run(&mut t.clone(), ValidationMode::Data).unwrap();
    let (kind, path) = failure(run(&mut t, ValidationMode::Config));
    assert_eq!(kind, ValidationKind::StateData);
    assert_eq!(path, "/net:stats");
}

#[test]
fn test_disabled_feature() {
    let ctx = schema();
    let mut t = tree(&ctx, &[("/net:debug", Some("on"))]);
    let (kind, path) = failure(run(&mut t, ValidationMode::Data));
    assert_eq!(kind, ValidationKind::DisabledByFeature);
    assert_eq!(path, "/net:debug");
}

#[test]
fn test_mandatory_choice() {
    let ctx = schema();
    let mut t = tree(&ctx, &[("/net:addressing", None)]);
    let (kind, path) = failure(run(&mut t, ValidationMode::Data));
    assert_eq!(
        kind,
        ValidationKind::MissingChoice {
            choice: "how".into()
        }
    );
    assert_eq!(path, "/net:addressing");

    let mut diag = Diagnostics::new();
    t.new_path("/net:addressing/dhcp", Some(""), &mut diag).unwrap();
    run(&mut t, ValidationMode::Data).unwrap();

    // a fixed address replaces the dhcp case
    t.new_path("/net:addressing/address", Some("192.0.2.1"), &mut diag)
        .unwrap();
    assert_eq!(t.find_path("/net:addressing/dhcp").unwrap(), None);
    run(&mut t, ValidationMode::Data).unwrap();
}

#[test]
fn test_rpc_partitions() {
    let ctx = schema();
    let mut request = tree(&ctx, &[("/net:restart/delay", Some("5"))]);
    run(&mut request, ValidationMode::Rpc).unwrap();

    let (kind, path) = failure(run(&mut request.clone(), ValidationMode::RpcReply));
    assert_eq!(kind, ValidationKind::WrongPartition);
    assert_eq!(path, "/net:restart/delay");

    let (kind, path) = failure(run(&mut request.clone(), ValidationMode::Data));
    assert!(matches!(kind, ValidationKind::WrongOperation { .. }));
    assert_eq!(path, "/net:restart");

    let (kind, _) = failure(run(&mut request, ValidationMode::Notification));
    assert_eq!(
        kind,
        ValidationKind::WrongOperation {
            expected: "exactly one notification".into()
        }
    );

    let mut empty = tree(&ctx, &[("/net:restart", None)]);
    let (kind, path) = failure(run(&mut empty, ValidationMode::Rpc));
    assert_eq!(
        kind,
        ValidationKind::MissingMandatory {
            name: "delay".into()
        }
    );
    assert_eq!(path, "/net:restart");

    let mut reply = tree(&ctx, &[("/net:restart/status", Some("ok"))]);
    run(&mut reply, ValidationMode::RpcReply).unwrap();
}

#[test]
fn test_notification() {
    let ctx = schema();
    let mut t = tree(&ctx, &[("/net:link-down/ifname", Some("eth0"))]);
    run(&mut t, ValidationMode::Notification).unwrap();

    let mut none = DataTree::new(ctx);
    let (kind, path) = failure(run(&mut none, ValidationMode::Notification));
    assert!(matches!(kind, ValidationKind::WrongOperation { .. }));
    assert_eq!(path, "/");
}

#[test]
fn test_instance_identifier_resolution() {
    let ctx = schema();
    let mut t = tree(
        &ctx,
        &[
            ("/net:interfaces/interface[name='eth0']/type", Some("ethernet")),
            ("/net:watch", Some("/net:interfaces/interface[name=\"eth0\"]")),
        ],
    );
    // stored canonically
    assert_eq!(
        value(&t, "/net:watch"),
        Some("/net:interfaces/interface[name='eth0']")
    );
    run(&mut t, ValidationMode::Data).unwrap();

    let watch = node(&t, "/net:watch");
    t.change_term(watch, "/net:interfaces/interface[name='eth9']")
        .unwrap();
    let (kind, path) = failure(run(&mut t, ValidationMode::Data));
    assert_eq!(
        kind,
        ValidationKind::UnresolvedReference {
            value: "/net:interfaces/interface[name='eth9']".into()
        }
    );
    assert_eq!(path, "/net:watch");
}

#[test]
fn test_action_nested_in_data() {
    let ctx = schema();
    let reset = "/net:interfaces/interface[name='eth0']/reset";
    let mut request = tree(
        &ctx,
        &[("/net:interfaces/interface[name='eth0']/reset/hard", Some("true"))],
    );
    run(&mut request.clone(), ValidationMode::Rpc).unwrap();

    let (kind, path) = failure(run(&mut request.clone(), ValidationMode::Data));
    assert!(matches!(kind, ValidationKind::WrongOperation { .. }));
    assert_eq!(path, reset);

    let (kind, path) = failure(run(&mut request, ValidationMode::RpcReply));
    assert_eq!(kind, ValidationKind::WrongPartition);
    assert_eq!(path, format!("{reset}/hard"));

    let mut empty = tree(&ctx, &[(reset, None)]);
    let (kind, path) = failure(run(&mut empty, ValidationMode::Rpc));
    assert_eq!(
        kind,
        ValidationKind::MissingMandatory {
            name: "hard".into()
        }
    );
    assert_eq!(path, reset);
}

#[test]
fn test_reinserted_subtree_is_rechecked() {
    let ctx = schema();
    let mut t = tree(
        &ctx,
        &[("/net:interfaces/interface[name='eth0']/type", Some("ethernet"))],
    );
    run(&mut t, ValidationMode::Data).unwrap();
    let interfaces = node(&t, "/net:interfaces");
    let eth0 = node(&t, "/net:interfaces/interface[name='eth0']");
    let mtu = node(&t, "/net:interfaces/interface[name='eth0']/mtu");
    assert!(t.validity(mtu).is_empty());

    let mut diag = Diagnostics::new();
    t.unlink(eth0).unwrap();
    t.insert_child(interfaces, eth0, &mut diag).unwrap();
    for id in t.descendants(eth0) {
        assert!(t.validity(id).contains(Validity::UNCHECKED), "{}", t.path(id));
    }
    run(&mut t, ValidationMode::Data).unwrap();
    assert!(t.validity(mtu).is_empty());
}
