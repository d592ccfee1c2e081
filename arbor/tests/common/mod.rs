//! Shared schema and helpers for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use arbor::schema::{Context, ContextBuilder, LeafType, NodeDef};
use arbor::{DataTree, Diagnostics, Error, NodeId, WhenContext};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A small network-configuration schema exercising every node kind.
pub fn schema() -> Arc<Context> {
    let mut b = ContextBuilder::new();
    let m = b.module("net");

    let interfaces = b.add(m, None, "interfaces", NodeDef::container()).unwrap();
    let iface = b
        .add(m, Some(interfaces), "interface", NodeDef::list(&["name"]).unique(&["ip"]))
        .unwrap();
    b.add(m, Some(iface), "name", NodeDef::leaf(LeafType::String)).unwrap();
    let kinds = LeafType::Enumeration(vec![b.intern("ethernet"), b.intern("loopback")]);
    b.add(m, Some(iface), "type", NodeDef::leaf(kinds).mandatory()).unwrap();
    b.add(m, Some(iface), "mtu", NodeDef::leaf(LeafType::integer()).default("1500"))
        .unwrap();
    b.add(m, Some(iface), "ip", NodeDef::leaf(LeafType::String)).unwrap();
    b.add(
        m,
        Some(iface),
        "vlan",
        NodeDef::leaf(LeafType::integer())
            .default("1")
            .when("../type = 'ethernet'"),
    )
    .unwrap();
    let reset = b.add(m, Some(iface), "reset", NodeDef::action()).unwrap();
    let reset_input = b.add(m, Some(reset), "input", NodeDef::input()).unwrap();
    b.add(m, Some(reset_input), "hard", NodeDef::leaf(LeafType::Boolean).mandatory())
        .unwrap();

    let dns = b.add(m, None, "dns", NodeDef::container()).unwrap();
    b.add(
        m,
        Some(dns),
        "server",
        NodeDef::leaf_list(LeafType::String).ordered_by_user(),
    )
    .unwrap();
    b.add(
        m,
        Some(dns),
        "search",
        NodeDef::leaf_list(LeafType::String).default("local"),
    )
    .unwrap();

    let limits = b.add(m, None, "limits", NodeDef::container()).unwrap();
    b.add(
        m,
        Some(limits),
        "mode",
        NodeDef::leaf(LeafType::String).mandatory().default("auto"),
    )
    .unwrap();
    let peers = b
        .add(m, Some(limits), "peers", NodeDef::list(&["id"]).max_elements(2))
        .unwrap();
    b.add(m, Some(peers), "id", NodeDef::leaf(LeafType::integer())).unwrap();

    let system = b.add(m, None, "system", NodeDef::container()).unwrap();
    let clock = b.add(m, Some(system), "clock", NodeDef::container()).unwrap();
    b.add(
        m,
        Some(clock),
        "timezone",
        NodeDef::leaf(LeafType::String).default("UTC"),
    )
    .unwrap();
    b.add(m, Some(clock), "source", NodeDef::leaf(LeafType::String)).unwrap();

    let addressing = b.add(m, None, "addressing", NodeDef::presence_container()).unwrap();
    let how = b.add(m, Some(addressing), "how", NodeDef::choice().mandatory()).unwrap();
    let fixed = b.add(m, Some(how), "fixed", NodeDef::case()).unwrap();
    b.add(m, Some(fixed), "address", NodeDef::leaf(LeafType::String)).unwrap();
    b.add(m, Some(how), "dhcp", NodeDef::leaf(LeafType::Empty)).unwrap();

    let stats = b.add(m, None, "stats", NodeDef::container().config(false)).unwrap();
    b.add(m, Some(stats), "seen", NodeDef::leaf_list(LeafType::String)).unwrap();
    b.add(
        m,
        Some(stats),
        "events",
        NodeDef::leaf_list(LeafType::String).ordered_by_user(),
    )
    .unwrap();
    let route = b.add(m, Some(stats), "route", NodeDef::list(&[])).unwrap();
    b.add(m, Some(route), "dest", NodeDef::leaf(LeafType::String)).unwrap();
    b.add(m, Some(route), "via", NodeDef::leaf(LeafType::String)).unwrap();

    let owner = LeafType::Leafref {
        path: b.intern("/net:interfaces/interface/name"),
        target: None,
        require_instance: true,
    };
    b.add(m, None, "owner", NodeDef::leaf(owner)).unwrap();
    let watch = LeafType::InstanceIdentifier {
        require_instance: true,
    };
    b.add(m, None, "watch", NodeDef::leaf(watch)).unwrap();
    b.add(
        m,
        None,
        "debug",
        NodeDef::leaf(LeafType::String).if_feature("diagnostics"),
    )
    .unwrap();
    b.add(m, None, "notes", NodeDef::anydata()).unwrap();

    let restart = b.add(m, None, "restart", NodeDef::rpc()).unwrap();
    let input = b.add(m, Some(restart), "input", NodeDef::input()).unwrap();
    b.add(m, Some(input), "delay", NodeDef::leaf(LeafType::integer()).mandatory())
        .unwrap();
    let output = b.add(m, Some(restart), "output", NodeDef::output()).unwrap();
    b.add(m, Some(output), "status", NodeDef::leaf(LeafType::String)).unwrap();

    let link_down = b.add(m, None, "link-down", NodeDef::notification()).unwrap();
    b.add(m, Some(link_down), "ifname", NodeDef::leaf(LeafType::String)).unwrap();

    b.build().unwrap()
}

/// Build a tree from `(path, value)` pairs.
pub fn tree(ctx: &Arc<Context>, entries: &[(&str, Option<&str>)]) -> DataTree {
    let mut tree = DataTree::new(ctx.clone());
    let mut diag = Diagnostics::new();
    for (path, value) in entries {
        tree.new_path(path, *value, &mut diag).unwrap();
    }
    tree
}

pub fn node(tree: &DataTree, path: &str) -> NodeId {
    tree.find_path(path)
        .unwrap()
        .unwrap_or_else(|| panic!("no node at {path}"))
}

pub fn value<'t>(tree: &'t DataTree, path: &str) -> Option<&'t str> {
    tree.find_path(path).unwrap().and_then(|n| tree.value_str(n))
}

/// Decides conditions of the form `<path> = '<value>'`.
pub fn when_eq(ctx: &WhenContext<'_>, expr: &str) -> Result<bool, Error> {
    let Some((path, expected)) = expr.split_once('=') else {
        return Err(Error::InvalidArgument(format!("unsupported condition {expr}")));
    };
    let expected = expected.trim().trim_matches('\'');
    Ok(ctx.value(path.trim())? == Some(expected))
}
