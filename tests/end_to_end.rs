// End-to-end behavior through the public API: CSV in, snapshot out, queries on top

use archive_budget::{
    aggregate_partitioned, normalize, AmountError, Amount, DataQualityFlag, Dimension, Filter,
    InstitutionEntry, InstitutionType, Pipeline, PipelineConfig, PipelineError, ProjectType,
    QueryFacade, RawRow, SnapshotStore,
};
use std::io::Write;

fn pipeline() -> Pipeline {
    Pipeline::new(PipelineConfig::default()).unwrap()
}

#[test]
fn seoul_education_office_example() {
    let rows = vec![RawRow::new("서울시교육청", "서울", "1,000,000", "전자기록물 관리")];
    let output = pipeline().run(&rows, &[]);

    assert_eq!(output.records.len(), 1);
    let record = &output.records[0];
    assert_eq!(record.institution_type, InstitutionType::EducationAuthority);
    assert_eq!(record.amount, Amount::from_won(1_000_000));
    assert_eq!(record.project_type, ProjectType::Digitalization);

    let store = SnapshotStore::new();
    store.publish(output);
    let grouping = store.aggregate(&[Dimension::Region, Dimension::ProjectType]);

    assert_eq!(grouping.buckets.len(), 1);
    let bucket = &grouping.buckets[0];
    assert_eq!(bucket.key, vec!["서울".to_string(), "DIGITALIZATION".to_string()]);
    assert_eq!(bucket.sum_amount, Amount::from_won(1_000_000));
    assert_eq!(bucket.count, 1);
}

#[test]
fn normalizer_examples() {
    assert_eq!(normalize("1,234,500원").unwrap(), Amount::from_won(1_234_500));
    assert!(matches!(normalize("abc"), Err(AmountError::MalformedAmount { .. })));
}

#[test]
fn classification_is_deterministic_and_total() {
    let classifier = PipelineConfig::default().classifier();

    let first = classifier.classify("기록물 이관", "영구기록물관리기관");
    for _ in 0..10 {
        assert_eq!(classifier.classify("기록물 이관", "영구기록물관리기관"), first);
    }
    assert_eq!(classifier.classify("청사 조경 공사", ""), ProjectType::Unclassified);
}

#[test]
fn csv_with_korean_headers_and_bad_rows() {
    let mut budget = tempfile::NamedTempFile::new().unwrap();
    writeln!(budget, "기관,지역,상위기관,금액,사업명,비고").unwrap();
    writeln!(budget, "서울시교육청,서울,,\"1,000,000\",전자기록물 관리,").unwrap();
    writeln!(budget, "강남교육지원청,서울,서울시교육청,\"(5,000)\",기록물 정리,").unwrap();
    writeln!(budget, "부산광역시,부산,,미정,서고 소독,").unwrap();
    writeln!(budget, ",대구,,100,기록물 이관,").unwrap();
    writeln!(budget, "어딘가시,아틀란티스,,100,기록물 이관,").unwrap();
    budget.flush().unwrap();

    let file = std::fs::File::open(budget.path()).unwrap();
    let output = pipeline().run_csv(file, &[]).unwrap();

    assert_eq!(output.records.len(), 3);
    assert_eq!(output.quality.total_rows, 5);
    assert_eq!(output.quality.rejected_count(), 2);
    assert_eq!(output.quality.flagged_count(DataQualityFlag::NegativeAmount), 1);
    assert_eq!(output.quality.flagged_count(DataQualityFlag::MalformedAmount), 1);

    let child = &output.records[1];
    assert_eq!(child.amount, Amount::ZERO);
    assert_eq!(child.root_institution, "서울시교육청");

    let total: Amount = output.records.iter().map(|r| r.amount).sum();
    assert_eq!(total, Amount::from_won(1_000_000));
}

#[test]
fn unreadable_input_keeps_previous_snapshot() {
    let store = SnapshotStore::new();
    let p = pipeline();
    store.publish(p.run(&[RawRow::new("부산광역시", "부산", "500", "서고 소독")], &[]));

    let result = store.reload(|| p.run_csv("완전히,다른,표\n1,2,3\n".as_bytes(), &[]));

    assert!(matches!(result, Err(PipelineError::UnreadableInput(_))));
    let live = store.current();
    assert_eq!(live.version(), 1);
    assert_eq!(live.count(), 1);
}

#[test]
fn cyclic_institution_list_terminates() {
    let institutions = vec![
        InstitutionEntry::new("가기관").with_parent("나기관"),
        InstitutionEntry::new("나기관").with_parent("가기관"),
    ];
    let rows = vec![
        RawRow::new("가기관", "서울", "100", "기록물 정리"),
        RawRow::new("나기관", "서울", "200", "기록물 정리"),
    ];

    let output = pipeline().run(&rows, &institutions);

    for record in &output.records {
        assert!(!record.root_institution.is_empty());
        assert!(record.has_flag(DataQualityFlag::CyclicHierarchy));
    }
    assert_eq!(output.records[0].root_institution, "가기관");
    assert_eq!(output.records[1].root_institution, "나기관");
}

#[test]
fn empty_input_yields_empty_snapshot() {
    let output = pipeline().run(&[], &[]);
    let store = SnapshotStore::new();
    let snapshot = store.publish(output);

    let query = QueryFacade::new(&snapshot);
    for dims in [vec![Dimension::Region], vec![Dimension::Region, Dimension::ProjectType]] {
        let grouping = query.aggregate(&dims);
        assert!(grouping.buckets.is_empty());
        assert_eq!(grouping.total_amount(), Amount::ZERO);
    }
    assert_eq!(query.summary(&Filter::all()).count, 0);
}

#[test]
fn identical_runs_are_byte_identical() {
    let rows = vec![
        RawRow::new("서울시교육청", "서울", "1,000,000", "전자기록물 관리"),
        RawRow::new("수원시", "경기", "250,000.50", "기록관리시스템 유지보수"),
        RawRow::new("제주특별자치도", "제주", "x", "사업없음"),
    ];

    let encode = |p: &Pipeline| {
        let output = p.run(&rows, &[]);
        let groupings: Vec<_> = output.groupings.values().collect();
        (
            serde_json::to_string(&output.records).unwrap(),
            serde_json::to_string(&groupings).unwrap(),
            output.token,
        )
    };

    let p = pipeline();
    assert_eq!(encode(&p), encode(&p));
    assert_eq!(encode(&p), encode(&pipeline().with_workers(3)));
}

#[test]
fn conservation_across_partitions_and_dimensions() {
    let rows: Vec<RawRow> = (0..40)
        .map(|i| {
            let region = ["서울", "부산", "경기", "강원"][i % 4];
            let title = ["기록물 정리", "스캔 전자화", "서고 소독", "행사"][i % 3];
            RawRow::new(&format!("기관{}시", i % 7), region, &format!("{},000", i * 13), title)
        })
        .collect();
    let output = pipeline().run(&rows, &[]);
    let total: Amount = output.records.iter().map(|r| r.amount).sum();

    for dim in Dimension::ALL {
        for partitions in [1, 3, 8] {
            let grouping = aggregate_partitioned(&output.records, &[dim], partitions);
            assert_eq!(grouping.total_amount(), total);
            assert_eq!(grouping.total_count(), output.records.len());
        }
    }
}

#[test]
fn hot_reloaded_config_changes_classification() {
    let config = PipelineConfig::from_json(
        r#"{
            "rules": [
                {"id": "events", "pattern": "행사", "category": "SPECIAL_PROJECT"}
            ],
            "institution_keywords": [
                {"keyword": "교육청", "institution_type": "education_authority", "match_kind": "contains"}
            ],
            "regions": ["서울"]
        }"#,
    )
    .unwrap();
    let custom = Pipeline::new(config).unwrap();
    let rows = vec![RawRow::new("서울시교육청", "서울", "1,000", "기록 행사")];

    assert_eq!(pipeline().run(&rows, &[]).records[0].project_type, ProjectType::Unclassified);

    let store = SnapshotStore::new();
    store.publish(pipeline().run(&rows, &[]));
    let snapshot = store.reload(|| Ok(custom.run(&rows, &[]))).unwrap();

    assert_eq!(snapshot.version(), 2);
    assert_eq!(snapshot.records()[0].project_type, ProjectType::SpecialProject);
    assert_eq!(snapshot.records()[0].institution_type, InstitutionType::EducationAuthority);
}

#[test]
fn filtered_queries_over_live_snapshot() {
    let rows = vec![
        RawRow::new("서울시교육청", "서울", "1,000,000", "전자기록물 관리"),
        RawRow::new("부산광역시", "부산", "300,000", "기록물 정리"),
        RawRow::new("광주광역시", "광주", "700,000", "서고 소독"),
    ];
    let store = SnapshotStore::new();
    store.publish(pipeline().run(&rows, &[]));
    let snapshot = store.current();
    let query = QueryFacade::new(&snapshot);

    let filter = Filter::all().region("부산").region("광주");
    let hits = query.filter(&filter);
    assert_eq!(hits.len(), 2);

    let narrower = filter.clone().project_type(ProjectType::Preservation);
    assert_eq!(query.filter(&narrower).len(), 1);

    let grouping = query.filter_buckets(&filter, &[Dimension::ProjectType]);
    assert_eq!(grouping.total_amount(), Amount::from_won(1_000_000));

    let top = query.top_projects(&Filter::all(), 1);
    assert_eq!(top[0].institution_name, "서울시교육청");
}

#[test]
fn dashboard_export_with_long_region_names() {
    let csv = "region,org_type,organization,parent_org,budget_amount,project_detail\n\
               서울특별시,광역자치단체,서울특별시,,\"2,000,000\",기록물 정리\n\
               서울특별시,기초자치단체,종로구,서울특별시,\"500,000\",서고 항온항습\n\
               경상남도,광역자치단체,경상남도,,\"800,000\",스캔 전자화\n\
               충청북도,기초자치단체,청주시,,미정,기록물 이관\n";

    let output = pipeline().run_csv(csv.as_bytes(), &[]).unwrap();
    assert_eq!(output.records.len(), 4);
    assert_eq!(output.quality.rejected_count(), 0);
    assert_eq!(output.records[1].root_institution, "서울특별시");
    assert_eq!(output.records[2].region.as_str(), "경남");
    assert_eq!(output.records[3].region.as_str(), "충북");

    let store = SnapshotStore::new();
    let snapshot = store.publish(output);
    let query = QueryFacade::new(&snapshot);

    assert_eq!(query.filter(&Filter::all().region("서울특별시")).len(), 2);
    assert_eq!(query.filter(&Filter::all().region("경상남도")).len(), 1);

    let summary = query.summary(&Filter::all());
    assert_eq!(summary.unpriced_count, 1);
    assert_eq!(summary.mean_amount, Amount::from_won(1_100_000));
}
