//! Ontology serialization of hydrated graph outputs

use chrono::{TimeZone, Utc};
use geokg_core::{
    EntityKind, GeologicInterval, GraphOutput, Location, Provenance, RelationshipTriplet,
    Stratigraphy, TripletObject,
};
use geokg_graph::literal;
use geokg_graph::namespace::{rdf_type, wgs84, GSGU, GSOC, GSOG, GST, MSL, PROV, RDFS, XDD};
use geokg_graph::{IntervalVocabulary, OntologySerializer};
use oxrdf::{Graph, NamedNode, Subject, Term, Triple};
use oxttl::TurtleParser;

fn at(hour: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
}

fn shakopee_output() -> GraphOutput {
    let model = Provenance::new("mixtral")
        .with_version("8x7b")
        .with_requested_at(at(9));

    let mut triplet =
        RelationshipTriplet::from_raw("Minnesota", "has", "Shakopee Formation", EntityKind::StratName)
            .unwrap()
            .with_provenance(Some(model.clone()));

    let mut subject = Location::new("Minnesota").with_provenance(model);
    subject
        .set_coordinates(
            45.9896587,
            -94.6113288,
            Provenance::new("geocodingAPI")
                .with_version("v1")
                .with_url("https://geocode.maps.co/search?q=Minnesota")
                .with_requested_at(at(10)),
        )
        .unwrap();
    triplet.subject = subject;

    triplet.object = TripletObject::Stratigraphy(Stratigraphy {
        strat_name: "Shakopee".to_string(),
        strat_name_long: Some("Shakopee Formation".to_string()),
        rank: Some("Fm".to_string()),
        strat_name_id: Some(1205),
        fm: Some("Shakopee".to_string()),
        gp: Some("Prairie du Chien".to_string()),
        b_age: Some(478.6),
        t_age: Some(470.0),
        b_period: Some("Early Ordovician".to_string()),
        t_period: Some("Ordovician".to_string()),
        provenance: Some(
            Provenance::new("macrostrat")
                .with_version("2")
                .with_url("https://macrostrat.org/api/defs/strat_names?strat_name_id=1205")
                .with_requested_at(at(11)),
        ),
        ..Stratigraphy::default()
    });

    GraphOutput::new(vec![triplet])
}

fn parse(ttl: &str) -> Graph {
    let mut graph = Graph::new();
    for triple in TurtleParser::new().for_reader(ttl.as_bytes()) {
        graph.insert(&triple.unwrap());
    }
    graph
}

fn has(
    graph: &Graph,
    subject: impl Into<Subject>,
    predicate: NamedNode,
    object: impl Into<Term>,
) -> bool {
    graph.contains(&Triple::new(subject, predicate, object))
}

/// Whether some statement has this predicate and object
fn has_object(graph: &Graph, predicate: NamedNode, object: impl Into<Term>) -> bool {
    let object = object.into();
    graph
        .iter()
        .any(|t| t.predicate == predicate.as_ref() && t.object == object.as_ref())
}

fn vocabulary() -> IntervalVocabulary {
    IntervalVocabulary::from_records(&[
        GeologicInterval::new("Ordovician", "period"),
        GeologicInterval::new("Early Ordovician", "epoch"),
    ])
}

#[test]
fn test_formation_rank_and_group_membership() {
    let serializer = OntologySerializer::new(vocabulary());
    let result = serializer.to_graph(&shakopee_output());
    assert!(result.failures.is_empty(), "{:?}", result.failures);

    let ttl = result.to_turtle().unwrap();
    let graph = parse(&ttl);
    let formation = MSL.term("ShakopeeFormation");
    let group = MSL.term("PrairieduChienGroup");
    assert!(ttl.contains("msl:ShakopeeFormation"));
    assert!(has(&graph, formation.clone(), rdf_type(), GSGU.term("Formation")));
    assert!(has(&graph, formation.clone(), GSOC.term("isPartOf"), group.clone()));
    assert!(has(&graph, group, rdf_type(), GSGU.term("Group")));
    assert!(has(
        &graph,
        formation,
        RDFS.term("label"),
        literal::lang("Shakopee Formation", "en")
    ));
}

#[test]
fn test_deposition_and_time_span() {
    let ttl = OntologySerializer::new(vocabulary())
        .serialize(&shakopee_output())
        .unwrap();
    let graph = parse(&ttl);

    let occupies = GSOC.term("occupiesTimeDirectly");
    assert!(has_object(&graph, occupies.clone(), GST.term("OrdovicianPeriod")));
    assert!(has_object(&graph, occupies, GST.term("EarlyOrdovicianEpoch")));
    assert!(has_object(
        &graph,
        RDFS.term("label"),
        literal::lang("Deposition during Ordovician", "en")
    ));
    assert!(has_object(&graph, GSOC.term("hasDataValue"), literal::double(478.6)));
    assert!(has_object(&graph, GSOC.term("hasDataValue"), literal::double(470.0)));
}

#[test]
fn test_location_and_provenance() {
    let ttl = OntologySerializer::new(vocabulary())
        .serialize(&shakopee_output())
        .unwrap();
    let graph = parse(&ttl);

    assert!(has_object(
        &graph,
        GSOC.term("hasDataValue"),
        literal::string("( POINT -94.6113288 45.9896587 )")
    ));
    assert!(has(&graph, wgs84(), rdf_type(), GSOC.term("Geographic_Coordinate_System")));
    assert!(has(&graph, XDD.term("geocodingAPIQuery"), rdf_type(), PROV.term("activity")));
    assert!(has(
        &graph,
        MSL.term("macrostratQuery"),
        PROV.term("atLocation"),
        literal::any_uri("https://macrostrat.org/api/defs/strat_names?strat_name_id=1205")
    ));
    assert!(has(
        &graph,
        MSL.term("macrostratQuery"),
        PROV.term("requestedAt"),
        literal::date_time("2024-03-01T11:00:00+00:00")
    ));
    assert!(has(
        &graph,
        MSL.term("ShakopeeFormation"),
        PROV.term("wasGeneratedBy"),
        XDD.term("mixtral_query")
    ));
}

#[test]
fn test_missing_interval_is_reported_not_fatal() {
    let result = OntologySerializer::new(IntervalVocabulary::default()).to_graph(&shakopee_output());

    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].feature, "deposition_age");
    let graph = parse(&result.to_turtle().unwrap());
    assert!(has_object(&graph, rdf_type(), GSOG.term("Geologic_Time_Interval")));
}

#[test]
fn test_names_outside_prefixed_name_alphabet_parse_back() {
    let mut output = shakopee_output();
    if let TripletObject::Stratigraphy(strat) = &mut output.triplets[0].object {
        strat.strat_name = "Unit²".to_string();
        strat.strat_name_long = Some("Unit² Formation".to_string());
        strat.gp = Some("Red <Rock> \"Canyon\"".to_string());
    }

    let serializer = OntologySerializer::new(vocabulary());
    let result = serializer.to_graph(&output);
    let ttl = result.to_turtle().unwrap();
    let graph = parse(&ttl);

    assert_eq!(graph.len(), result.graph.len(), "{ttl}");
    let unit = MSL.term("Unit²Formation");
    assert!(has(&graph, unit.clone(), rdf_type(), GSGU.term("Formation")));
    assert!(has(
        &graph,
        unit,
        GSOC.term("isPartOf"),
        MSL.term("Red<Rock>\"Canyon\"Group")
    ));
}

#[test]
fn test_same_input_same_turtle() {
    let serializer = OntologySerializer::new(vocabulary());
    let output = shakopee_output();
    let first = serializer.serialize(&output).unwrap();

    let roundtripped: GraphOutput =
        serde_json::from_str(&serde_json::to_string(&output).unwrap()).unwrap();
    assert_eq!(serializer.serialize(&roundtripped).unwrap(), first);
}
