//! Tests for the DNS resolver against a stub server

mod common;

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use common::{DnsAnswer, StubDns};
use sni_relay::error::ResolveError;
use sni_relay::{DnsResolver, Resolver};

#[tokio::test]
async fn test_first_answer_wins() {
    let dns = StubDns::spawn(DnsAnswer::Records(vec![
        Ipv4Addr::new(203, 0, 113, 10),
        Ipv4Addr::new(203, 0, 113, 11),
    ]))
    .await;
    let resolver = DnsResolver::new(dns.addr.to_string());

    let ip = resolver.resolve_ipv4("blocked.example").await.unwrap();
    assert_eq!(ip, Ipv4Addr::new(203, 0, 113, 10));
    assert_eq!(dns.queried(), vec!["blocked.example.".to_string()]);
}

#[tokio::test]
async fn test_empty_answer_is_no_address() {
    let dns = StubDns::spawn(DnsAnswer::Records(vec![])).await;
    let resolver = DnsResolver::new(dns.addr.to_string());

    let err = resolver.resolve_ipv4("blocked.example").await.unwrap_err();
    match err {
        ResolveError::NoAddress { hostname } => assert_eq!(hostname, "blocked.example"),
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_nxdomain_is_no_address() {
    let dns = StubDns::spawn(DnsAnswer::NxDomain).await;
    let resolver = DnsResolver::new(dns.addr.to_string());

    let err = resolver.resolve_ipv4("missing.example").await.unwrap_err();
    assert!(matches!(err, ResolveError::NoAddress { .. }));
}

#[tokio::test]
async fn test_silent_server_times_out() {
    let dns = StubDns::spawn(DnsAnswer::Silent).await;
    let resolver = DnsResolver::with_timeout(dns.addr.to_string(), Duration::from_millis(200));

    let start = Instant::now();
    let err = resolver.resolve_ipv4("blocked.example").await.unwrap_err();
    match &err {
        ResolveError::Timeout { hostname, .. } => assert_eq!(hostname, "blocked.example"),
        other => panic!("unexpected error: {}", other),
    }
    assert!(err.to_string().contains("blocked.example"));
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_unresolvable_server_address() {
    let resolver = DnsResolver::new("not a server");

    let err = resolver.resolve_ipv4("blocked.example").await.unwrap_err();
    match &err {
        ResolveError::Transport { hostname, server, .. } => {
            assert_eq!(hostname, "blocked.example");
            assert_eq!(server, "not a server");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_each_lookup_queries_again() {
    let dns = StubDns::spawn(DnsAnswer::Records(vec![Ipv4Addr::new(198, 51, 100, 1)])).await;
    let resolver = DnsResolver::new(dns.addr.to_string());

    resolver.resolve_ipv4("a.example").await.unwrap();
    resolver.resolve_ipv4("a.example").await.unwrap();
    assert_eq!(dns.queried().len(), 2);
}
