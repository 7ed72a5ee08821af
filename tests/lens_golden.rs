use puppet_auth::{parse, serialize, Document};
use std::fs;

fn load_fixture(name: &str) -> String {
    fs::read_to_string(format!("tests/fixtures/{name}"))
        .unwrap_or_else(|err| panic!("failed to load fixture {name}: {err}"))
}

#[test]
fn fixtures_round_trip_byte_for_byte() {
    for name in ["full.conf", "continued.conf"] {
        let text = load_fixture(name);
        let tree = parse(&text).unwrap_or_else(|err| panic!("{name}: {err}"));
        assert_eq!(serialize(&tree).unwrap(), text, "{name} did not round-trip");
        assert!(!tree.has_changes());
    }
}

#[test]
fn continued_lists_dump() {
    let doc = Document::parse(&load_fixture("continued.conf")).unwrap();
    let expected = "\
/#comment = \"Lists may continue across lines after a trailing comma.\"
/path[1] = \"^/file_(metadata|content)/modules/\"
/path[1]/operator = \"~\"
/path[1]/environment
/path[1]/environment/1 = \"production\"
/path[1]/environment/2 = \"staging\"
/path[1]/method
/path[1]/method/1 = \"find\"
/path[1]/method/2 = \"search\"
/path[1]/auth = \"yes\"
/path[1]/allow
/path[1]/allow/1 = \"host1.example.com\"
/path[1]/allow/2 = \"host2.example.com\"
/path[1]/allow/3 = \"*.dev.example.com\"
/path[1]/allow_ip
/path[1]/allow_ip/1 = \"10.0.0.0/8\"
/path[1]/allow_ip/2 = \"192.168.0.*\"
/#empty
/path[2] = \"/status\"
/path[2]/method
/path[2]/method/1 = \"find\"
/path[2]/allow
/path[2]/allow/1 = \"*\"
";
    assert_eq!(doc.dump("*").unwrap(), expected);
}

#[test]
fn default_file_structure() {
    let doc = Document::parse(&load_fixture("full.conf")).unwrap();
    assert_eq!(doc.count("path").unwrap(), 9);
    assert_eq!(doc.count("path[operator]").unwrap(), 2);
    assert_eq!(doc.count("path[count(allow)=0]").unwrap(), 1);
    assert_eq!(doc.get("path[count(allow)=0]").unwrap(), Some("/"));
    assert_eq!(doc.get("path[last()]/auth").unwrap(), Some("any"));
    assert_eq!(doc.count("path[auth='any']").unwrap(), 4);
    assert_eq!(doc.count("path/method/*[.='save']").unwrap(), 2);
}

#[test]
fn broken_fixture_reports_the_line() {
    let err = parse(&load_fixture("broken.conf")).unwrap_err();
    assert_eq!(err.line, 3);
    assert!(err.message.contains("methd"));
    assert!(err.message.contains("did you mean 'method'"));
}

#[test]
fn edits_leave_other_lines_alone() {
    let text = load_fixture("continued.conf");
    let mut doc = Document::parse(&text).unwrap();
    doc.set("path[.='/status']/allow/1", "localhost").unwrap();
    let output = doc.serialize().unwrap();

    let (head, tail) = output.split_at(output.find("path /status").unwrap());
    assert!(text.starts_with(head));
    assert!(tail.starts_with("path /status\n\tmethod find\n"));
    assert!(tail.contains("localhost"));
    assert!(!tail.contains('*'));
}
