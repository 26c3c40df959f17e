//! Mineral features

use super::{add_authority_provenance, FeatureContext, FeatureError};
use crate::intervals::class_local_name;
use crate::namespace::{GSOG, GSRM, RDFS};
use crate::rdf::{literal, GraphDelta};
use geokg_core::schema::non_empty;
use geokg_core::{Mineral, TripletObject};

/// `"native gold"` → `"NativeGold"`
pub fn mineral_name(mineral: &Mineral) -> String {
    class_local_name(&mineral.mineral)
}

/// Rock material classes and a descriptive label. Authority provenance is
/// attached once the mineral has been hydrated.
pub fn mineral_type(ctx: &FeatureContext<'_>) -> Result<GraphDelta, FeatureError> {
    let TripletObject::Mineral(mineral) = &ctx.triplet.object else {
        return Err(FeatureError::MissingAttribute(format!(
            "mineral ({} is stratigraphic)",
            ctx.triplet.object.name()
        )));
    };

    let mut delta = GraphDelta::new();
    delta.add_type(ctx.object_node.clone(), GSOG.term("Rock_Material"));
    delta.add_type(ctx.object_node.clone(), GSRM.term(&mineral_name(mineral)));

    let label = std::iter::once(mineral.mineral.trim())
        .chain(non_empty(&mineral.mineral_type))
        .chain(non_empty(&mineral.formula))
        .collect::<Vec<_>>()
        .join(", ");
    delta.add(ctx.object_node.clone(), RDFS.term("label"), literal::lang(label, "en"));

    if mineral.is_hydrated() {
        add_authority_provenance(&mut delta, ctx, ctx.object_node.clone())?;
    }
    Ok(delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intervals::IntervalVocabulary;
    use crate::namespace::{rdf_type, MSL, PROV, XDD};
    use geokg_core::{EntityKind, Provenance, RelationshipTriplet};

    fn agrinierite(hydrated: bool) -> RelationshipTriplet {
        let mut triplet = RelationshipTriplet::from_raw(
            "Margnac Mine",
            "contains",
            "agrinierite",
            EntityKind::Mineral,
        )
        .unwrap();
        if hydrated {
            triplet.object = TripletObject::Mineral(Mineral {
                mineral: "agrinierite".to_string(),
                mineral_id: Some(58),
                mineral_type: Some("uranium".to_string()),
                formula: Some("K2(Ca,Sr)[(UO2)3O3(OH)2]2·5H2O".to_string()),
                provenance: Some(
                    Provenance::new("macrostrat")
                        .with_version("2")
                        .with_url("https://macrostrat.org/api/defs/minerals?mineral_id=58"),
                ),
                ..Mineral::default()
            });
        }
        triplet
    }

    #[test]
    fn test_hydrated_mineral() {
        let triplet = agrinierite(true);
        let intervals = IntervalVocabulary::default();
        let ctx = FeatureContext::new(&triplet, &intervals);
        assert_eq!(ctx.object_node, XDD.term("Agrinierite"));

        let delta = mineral_type(&ctx).unwrap();
        assert!(delta.contains(ctx.object_node.clone(), rdf_type(), GSOG.term("Rock_Material")));
        assert!(delta.contains(ctx.object_node.clone(), rdf_type(), GSRM.term("Agrinierite")));
        assert!(delta.contains(
            ctx.object_node.clone(),
            RDFS.term("label"),
            literal::lang("agrinierite, uranium, K2(Ca,Sr)[(UO2)3O3(OH)2]2·5H2O", "en")
        ));
        assert!(delta.contains(
            ctx.object_node.clone(),
            PROV.term("wasGeneratedBy"),
            MSL.term("macrostratQuery")
        ));
    }

    #[test]
    fn test_unhydrated_mineral_has_types_only() {
        let triplet = agrinierite(false);
        let intervals = IntervalVocabulary::default();
        let ctx = FeatureContext::new(&triplet, &intervals);
        let delta = mineral_type(&ctx).unwrap();

        assert_eq!(delta.len(), 3);
        assert!(delta.contains(
            ctx.object_node.clone(),
            RDFS.term("label"),
            literal::lang("agrinierite", "en")
        ));
    }
}
