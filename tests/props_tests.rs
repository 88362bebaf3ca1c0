#[cfg(test)]
mod tests {
    use thread_runner::{
        errors::Error,
        props::{
            dir_stats, get_prop, json_dump, parse_count, parse_prop, path_iter, set_prop,
            set_prop_with_schema, PropStore,
        },
    };
    use serde_json::{json, Value};
    use std::fs;

    #[test]
    fn test_get_set_nested() {
        let mut root = json!({});

        let old = set_prop(&mut root, "node.cpu.count", json!(4), false).unwrap();
        assert!(old.is_none());
        assert_eq!(get_prop(&root, "node.cpu.count").unwrap(), &json!(4));

        let old = set_prop(&mut root, "node.cpu.count", json!(8), false).unwrap();
        assert_eq!(old, Some(json!(4)));

        assert!(matches!(get_prop(&root, "node.mem"), Err(Error::InvalidProperty(_))));
        assert!(matches!(get_prop(&root, "node.cpu.count.x"), Err(Error::InvalidProperty(_))));
    }

    #[test]
    fn test_set_verify() {
        let mut root = json!({"node": {"host": "a", "port": 22}});

        let old = set_prop(&mut root, "node.port", json!(2222), true).unwrap();
        assert_eq!(old, Some(json!(22)));
        assert_eq!(root["node"]["port"], json!(2222));

        match set_prop(&mut root, "node.port", json!("22"), true) {
            Err(Error::InvalidProperty(msg)) => assert!(msg.contains("type is"), "{}", msg),
            other => panic!("ожидали ошибку типа, получили {:?}", other),
        }
        assert!(matches!(
            set_prop(&mut root, "node.user", json!("root"), true),
            Err(Error::InvalidProperty(_))
        ));
        assert!(matches!(
            set_prop(&mut root, "other.user", json!("root"), true),
            Err(Error::InvalidProperty(_))
        ));
        // Через не-объект путь не проходит даже без verify
        assert!(matches!(
            set_prop(&mut root, "node.host.name", json!("x"), false),
            Err(Error::InvalidProperty(_))
        ));
    }

    #[test]
    fn test_set_with_schema() {
        let schema = json!({"node": {"host": "", "port": 0, "tags": []}});
        let mut root = json!({"node": {"host": "a"}});

        // Нет в данных, но объявлено в схеме
        let old = set_prop_with_schema(&mut root, "node.port", json!(22), true, Some(&schema)).unwrap();
        assert!(old.is_none());
        assert_eq!(root["node"]["port"], json!(22));

        // Существующее свойство по-прежнему сверяется по типу
        assert!(matches!(
            set_prop_with_schema(&mut root, "node.host", json!(1), true, Some(&schema)),
            Err(Error::InvalidProperty(_))
        ));
        // Нет ни в данных, ни в схеме
        assert!(matches!(
            set_prop_with_schema(&mut root, "node.user", json!("root"), true, Some(&schema)),
            Err(Error::InvalidProperty(_))
        ));
        // Без схемы отсутствующее свойство не пишется
        assert!(matches!(
            set_prop_with_schema(&mut root, "node.tags", json!([]), true, None),
            Err(Error::InvalidProperty(_))
        ));
        assert!(root["node"].get("tags").is_none());
    }

    #[test]
    fn test_dir_stats() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.json"), "12345").unwrap();
        fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        fs::write(dir.path().join("sub/b.txt"), "abc").unwrap();
        fs::write(dir.path().join("sub/deeper/c.txt"), "").unwrap();

        let stats = dir_stats(dir.path()).unwrap();
        assert_eq!(stats.path.as_path(), dir.path());
        assert_eq!(stats.file_count, 3);
        assert_eq!(stats.total_bytes, 8);

        assert!(matches!(dir_stats(dir.path().join("missing")), Err(Error::Io(_))));
    }

    #[test]
    fn test_path_iter_sorted() {
        let root = json!({"b": {"y": 2, "x": 1}, "a": true});
        let paths: Vec<_> = path_iter(&root).into_iter().map(|(p, v)| (p, v.clone())).collect();
        assert_eq!(
            paths,
            vec![
                ("a".to_string(), json!(true)),
                ("b.x".to_string(), json!(1)),
                ("b.y".to_string(), json!(2)),
            ]
        );
    }

    #[test]
    fn test_json_dump_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        json_dump(&json!({"z": 1, "a": {"b": [1, 2]}}), &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("{\n    \"a\""), "{}", text);
        assert!(!dir.path().join("state.json.json_dump.tmp").exists());
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back["z"], json!(1));
    }

    #[test]
    fn test_prop_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut store = PropStore::open(&path).unwrap();
        assert_eq!(store.iter().len(), 0);
        store.set("pool.threads", json!(10), false).unwrap();
        store.set("pool.name", json!("workers"), false).unwrap();
        store.save().unwrap();

        let mut store = PropStore::open(&path).unwrap();
        assert_eq!(store.get("pool.threads").unwrap(), &json!(10));
        store.set("pool.threads", json!(4), true).unwrap();
        assert!(store.set("pool.threads", json!("4"), true).is_err());
        assert_eq!(store.iter().len(), 2);
        assert_eq!(store.path(), path.as_path());
        assert_eq!(store.data()["pool"]["name"], json!("workers"));
    }

    #[test]
    fn test_parse_prop() {
        assert_eq!(parse_prop("foo=hello").unwrap(), ("foo".to_string(), json!("hello")));
        assert_eq!(parse_prop("bar:int=123").unwrap(), ("bar".to_string(), json!(123)));
        assert_eq!(parse_prop("ratio:float=0.5").unwrap(), ("ratio".to_string(), json!(0.5)));
        assert_eq!(parse_prop("on:bool=yes").unwrap(), ("on".to_string(), json!(true)));
        assert_eq!(parse_prop("list:json=[1,2]").unwrap(), ("list".to_string(), json!([1, 2])));
        assert_eq!(parse_prop("flag").unwrap(), ("flag".to_string(), Value::Null));
        assert_eq!(parse_prop("eq=a=b").unwrap(), ("eq".to_string(), json!("a=b")));

        assert!(matches!(parse_prop("bar:int=abc"), Err(Error::InvalidProperty(_))));
        assert!(matches!(parse_prop("bar:nope=1"), Err(Error::InvalidProperty(_))));
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("5").unwrap(), (1, 6));
        assert_eq!(parse_count("3..7").unwrap(), (3, 8));

        for bad in ["", "x", "1..", "..2", "1..2..3", "a..b"] {
            match parse_count(bad) {
                Err(err @ Error::InvalidRange(_)) => {
                    assert_eq!(err.kind(), "InvalidRange");
                    assert!(err.to_string().starts_with("invalid range: "));
                }
                other => panic!("{:?}: ожидали InvalidRange, получили {:?}", bad, other),
            }
        }
    }
}
