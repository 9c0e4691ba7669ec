use manifest_index_core::{
    Manifest, ManifestIndex, MatchType, PackageMatchField, PackageMatchFilter, RequestMatch,
    SchemaVersion, SearchRequest, SearchResult,
};

fn manifest(id: &str, name: &str, moniker: &str, tags: &[&str], commands: &[&str]) -> Manifest {
    let mut manifest = Manifest::new(id, name, "1.0");
    manifest.moniker = Some(moniker.to_string());
    manifest.tags = tags.iter().map(|tag| tag.to_string()).collect();
    manifest.commands = commands.iter().map(|command| command.to_string()).collect();
    manifest
}

fn sample_index(dir: &std::path::Path) -> ManifestIndex {
    let mut index = ManifestIndex::create_new(dir.join("index.db"), SchemaVersion::LATEST).unwrap();
    for (manifest, path) in [
        (
            manifest("Contoso.Editor", "Contoso Editor", "editor", &["text", "code"], &["ced"]),
            "c/Contoso.Editor/1.0.json",
        ),
        (
            manifest("Fabrikam.TextTool", "Text Tool", "tt", &["text"], &[]),
            "f/Fabrikam.TextTool/1.0.json",
        ),
        (
            manifest("Northwind.Edit", "Northwind Edit", "nwe", &["utility"], &["edit"]),
            "n/Northwind.Edit/1.0.json",
        ),
    ] {
        index.add_manifest(&manifest, path).unwrap();
    }
    index
}

fn ids(index: &ManifestIndex, result: &SearchResult) -> Vec<String> {
    result
        .matches
        .iter()
        .map(|(id, _)| index.get_id_string_by_id(*id).unwrap().unwrap())
        .collect()
}

fn tag_filter(match_type: MatchType, value: &str) -> PackageMatchFilter {
    PackageMatchFilter::new(PackageMatchField::Tag, match_type, value)
}

#[test]
fn exact_query_reports_the_field_that_matched() {
    let dir = tempfile::tempdir().unwrap();
    let index = sample_index(dir.path());

    let result = index
        .search(&SearchRequest::query(MatchType::Exact, "editor"))
        .unwrap();

    assert_eq!(ids(&index, &result), vec!["Contoso.Editor"]);
    let criterion = result.matches[0].1.as_ref().unwrap();
    assert_eq!(criterion.field, PackageMatchField::Moniker);
    assert_eq!(criterion.match_type, MatchType::Exact);
    assert!(!result.truncated);
}

#[test]
fn substring_query_returns_each_package_once_in_id_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut index = sample_index(dir.path());
    let mut second = manifest("Contoso.Editor", "Contoso Editor", "editor", &["text"], &[]);
    second.version = "2.0".to_string();
    index.add_manifest(&second, "c/Contoso.Editor/2.0.json").unwrap();

    let result = index
        .search(&SearchRequest::query(MatchType::Substring, "edit"))
        .unwrap();

    assert_eq!(ids(&index, &result), vec!["Contoso.Editor", "Northwind.Edit"]);
    for (_, criterion) in &result.matches {
        assert_eq!(criterion.as_ref().unwrap().field, PackageMatchField::Id);
    }
}

#[test]
fn stronger_match_type_sorts_first() {
    let dir = tempfile::tempdir().unwrap();
    let index = sample_index(dir.path());

    let request = SearchRequest {
        query: Some(RequestMatch::new(MatchType::Substring, "tool")),
        inclusions: vec![tag_filter(MatchType::Exact, "utility")],
        ..SearchRequest::default()
    };
    let result = index.search(&request).unwrap();

    assert_eq!(ids(&index, &result), vec!["Northwind.Edit", "Fabrikam.TextTool"]);
    assert_eq!(
        result.matches[0].1.as_ref().unwrap().match_type,
        MatchType::Exact
    );
    assert_eq!(
        result.matches[1].1.as_ref().unwrap().match_type,
        MatchType::Substring
    );
}

#[test]
fn filters_without_query_narrow_the_whole_index() {
    let dir = tempfile::tempdir().unwrap();
    let index = sample_index(dir.path());

    let request = SearchRequest {
        filters: vec![tag_filter(MatchType::Exact, "text")],
        ..SearchRequest::default()
    };
    let result = index.search(&request).unwrap();

    assert_eq!(ids(&index, &result), vec!["Contoso.Editor", "Fabrikam.TextTool"]);
    assert!(result.matches.iter().all(|(_, criterion)| criterion.is_none()));
}

#[test]
fn every_filter_must_hold() {
    let dir = tempfile::tempdir().unwrap();
    let index = sample_index(dir.path());

    let request = SearchRequest {
        query: Some(RequestMatch::new(MatchType::Substring, "t")),
        filters: vec![
            tag_filter(MatchType::Exact, "text"),
            PackageMatchFilter::new(PackageMatchField::Command, MatchType::Exact, "ced"),
        ],
        ..SearchRequest::default()
    };
    let result = index.search(&request).unwrap();

    assert_eq!(ids(&index, &result), vec!["Contoso.Editor"]);
}

#[test]
fn maximum_results_truncates_and_flags_it() {
    let dir = tempfile::tempdir().unwrap();
    let index = sample_index(dir.path());

    let limited = index
        .search(&SearchRequest {
            maximum_results: 1,
            ..SearchRequest::default()
        })
        .unwrap();
    assert_eq!(ids(&index, &limited), vec!["Contoso.Editor"]);
    assert!(limited.truncated);

    let roomy = index
        .search(&SearchRequest {
            maximum_results: 3,
            ..SearchRequest::default()
        })
        .unwrap();
    assert_eq!(roomy.matches.len(), 3);
    assert!(!roomy.truncated);
}

#[test]
fn case_sensitivity_follows_match_type() {
    let dir = tempfile::tempdir().unwrap();
    let index = sample_index(dir.path());

    let exact = index
        .search(&SearchRequest::query(MatchType::Exact, "CONTOSO.EDITOR"))
        .unwrap();
    assert!(exact.matches.is_empty());

    let folded = index
        .search(&SearchRequest::query(MatchType::CaseInsensitive, "CONTOSO.EDITOR"))
        .unwrap();
    assert_eq!(ids(&index, &folded), vec!["Contoso.Editor"]);

    let prefix = index
        .search(&SearchRequest::query(MatchType::StartsWith, "FABRIKAM"))
        .unwrap();
    assert_eq!(ids(&index, &prefix), vec!["Fabrikam.TextTool"]);
}

#[test]
fn like_wildcards_in_query_are_literal() {
    let dir = tempfile::tempdir().unwrap();
    let index = sample_index(dir.path());

    for pattern in ["%", "_", "Contoso_Editor"] {
        let result = index
            .search(&SearchRequest::query(MatchType::Substring, pattern))
            .unwrap();
        assert!(result.matches.is_empty(), "pattern {pattern} matched");
    }
}
