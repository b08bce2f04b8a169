use oclink::error::TranslateError;
use oclink::model::{Endpoint, PortKind};

#[test]
fn parse_and_format_round_trip() {
    for spec in ["5#out:1", "11#in:2", "42#out:7"] {
        let ep = Endpoint::parse(spec).expect("valid endpoint");
        assert_eq!(ep.format(), spec);
        assert_eq!(Endpoint::parse(&ep.format()).unwrap(), ep);
    }
}

#[test]
fn parse_fields() {
    let ep = Endpoint::parse("18#out:1").unwrap();
    assert_eq!(ep.block_sid, "18");
    assert_eq!(ep.port_kind, PortKind::Out);
    assert_eq!(ep.port_index, 1);

    let ep = Endpoint::parse("3#in:2").unwrap();
    assert_eq!(ep.port_kind, PortKind::In);
    assert_eq!(ep.port_index, 2);
}

#[test]
fn malformed_endpoints_are_rejected() {
    for bad in ["5out:1", "5#out", "5#out:", "5#out:0", "5#side:1", "", "#:"] {
        match Endpoint::parse(bad) {
            Err(TranslateError::EndpointMalformed(spec)) => assert_eq!(spec, bad),
            other => panic!("expected EndpointMalformed for '{}', got {:?}", bad, other),
        }
    }
}

#[test]
fn non_numeric_index_is_rejected() {
    assert!(Endpoint::parse("5#out:x").is_err());
    assert!(Endpoint::parse("5#out:-1").is_err());
}
