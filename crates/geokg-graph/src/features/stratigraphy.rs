//! Stratigraphic unit features

use super::{add_authority_provenance, entity_name, FeatureContext, FeatureError};
use crate::intervals::title_case;
use crate::namespace::{GSGU, GSOC, GSOG, GSPR, MSL, RDFS};
use crate::rdf::{literal, GraphDelta, NamedNode};
use geokg_core::schema::non_empty;
use geokg_core::{Stratigraphy, TripletObject};

/// Lithostratigraphic rank, ordered from smallest to largest unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Rank {
    Bed,
    Member,
    Formation,
    Group,
    Supergroup,
}

impl Rank {
    pub const ALL: [Rank; 5] = [
        Rank::Bed,
        Rank::Member,
        Rank::Formation,
        Rank::Group,
        Rank::Supergroup,
    ];

    /// Macrostrat rank abbreviation (`Fm`, `SGp`, ...)
    pub fn from_abbreviation(value: &str) -> Option<Self> {
        match value.trim() {
            "Bed" => Some(Rank::Bed),
            "Mbr" => Some(Rank::Member),
            "Fm" => Some(Rank::Formation),
            "Gp" => Some(Rank::Group),
            "SGp" => Some(Rank::Supergroup),
            _ => None,
        }
    }

    /// Rank named by a unit's trailing word, e.g. `Formation` or `Fm`
    pub fn from_word(word: &str) -> Option<Self> {
        let word = title_case(word);
        if word.len() > 3 {
            Rank::ALL.into_iter().find(|rank| rank.expansion() == word)
        } else {
            Rank::from_abbreviation(&word)
        }
    }

    pub fn expansion(self) -> &'static str {
        match self {
            Rank::Bed => "Bed",
            Rank::Member => "Member",
            Rank::Formation => "Formation",
            Rank::Group => "Group",
            Rank::Supergroup => "Supergroup",
        }
    }

    pub fn class(self) -> NamedNode {
        GSGU.term(self.expansion())
    }

    /// Name of the unit of this rank recorded on `strat`
    fn attribute(self, strat: &Stratigraphy) -> Option<&str> {
        let value = match self {
            Rank::Bed => &strat.bed,
            Rank::Member => &strat.mbr,
            Rank::Formation => &strat.fm,
            Rank::Group => &strat.gp,
            Rank::Supergroup => &strat.sgp,
        };
        non_empty(value)
    }
}

fn stratigraphy<'a>(ctx: &FeatureContext<'a>) -> Result<&'a Stratigraphy, FeatureError> {
    match &ctx.triplet.object {
        TripletObject::Stratigraphy(strat) => Ok(strat),
        TripletObject::Mineral(m) => Err(FeatureError::MissingAttribute(format!(
            "stratigraphy ({} is a mineral)",
            m.mineral
        ))),
    }
}

/// Rank class from the authority's rank, else from the name's last word,
/// else the generic stratigraphic unit class
pub fn stratigraphic_type(ctx: &FeatureContext<'_>) -> Result<GraphDelta, FeatureError> {
    let strat = stratigraphy(ctx)?;
    let rank = non_empty(&strat.rank)
        .and_then(Rank::from_abbreviation)
        .or_else(|| {
            strat
                .strat_name
                .split_whitespace()
                .last()
                .and_then(Rank::from_word)
        });

    let class = rank
        .map(Rank::class)
        .unwrap_or_else(|| GSGU.term("StratigraphicUnit"));

    let mut delta = GraphDelta::new();
    delta.add_type(ctx.object_node.clone(), class);
    Ok(delta)
}

pub fn stratigraphic_label(ctx: &FeatureContext<'_>) -> Result<GraphDelta, FeatureError> {
    let strat = stratigraphy(ctx)?;
    let mut delta = GraphDelta::new();
    delta.add(
        ctx.object_node.clone(),
        RDFS.term("label"),
        literal::lang(strat.display_name(), "en"),
    );
    Ok(delta)
}

/// `gsoc:isPartOf` edges to the enclosing and enclosed units the authority
/// lists for this unit
pub fn stratigraphic_rank_relations(ctx: &FeatureContext<'_>) -> Result<GraphDelta, FeatureError> {
    let strat = stratigraphy(ctx)?;
    let mut delta = GraphDelta::new();

    let Some(rank) = non_empty(&strat.rank) else {
        return Ok(delta);
    };
    let own_rank =
        Rank::from_abbreviation(rank).ok_or_else(|| FeatureError::UnknownRank(rank.to_string()))?;

    for related_rank in Rank::ALL {
        let Some(name) = related_rank.attribute(strat) else {
            continue;
        };
        if related_rank == own_rank {
            continue;
        }

        let related = MSL.term(&entity_name(&format!("{name}{}", related_rank.expansion())));
        delta.add_type(related.clone(), related_rank.class());
        if related_rank < own_rank {
            delta.add(related.clone(), GSOC.term("isPartOf"), ctx.object_node.clone());
        } else {
            delta.add(ctx.object_node.clone(), GSOC.term("isPartOf"), related.clone());
        }
        add_authority_provenance(&mut delta, ctx, related)?;
    }

    Ok(delta)
}

/// One `gspr:Deposition` per distinct top/base period
pub fn deposition_age(ctx: &FeatureContext<'_>) -> Result<GraphDelta, FeatureError> {
    let strat = stratigraphy(ctx)?;
    let mut delta = GraphDelta::new();

    let mut periods: Vec<&str> = [&strat.t_period, &strat.b_period]
        .into_iter()
        .filter_map(non_empty)
        .collect();
    periods.dedup();

    for period in periods {
        let interval = ctx
            .intervals
            .class_for(period)
            .ok_or_else(|| FeatureError::UnknownInterval(period.to_string()))?;

        let deposition = delta.blank_node();
        delta.add_type(deposition.clone(), GSPR.term("Deposition"));
        delta.add(
            deposition.clone(),
            RDFS.term("label"),
            literal::lang(format!("Deposition during {period}"), "en"),
        );
        delta.add(deposition.clone(), GSOC.term("occupiesTimeDirectly"), interval);
        delta.add(ctx.object_node.clone(), GSOC.term("isParticipantIn"), deposition.clone());
        add_authority_provenance(&mut delta, ctx, deposition)?;
    }

    Ok(delta)
}

/// Numeric age range, in Ma, when both bounds are known
pub fn time_span(ctx: &FeatureContext<'_>) -> Result<GraphDelta, FeatureError> {
    let strat = stratigraphy(ctx)?;
    let mut delta = GraphDelta::new();
    let (Some(b_age), Some(t_age)) = (strat.b_age, strat.t_age) else {
        return Ok(delta);
    };

    let interval = delta.blank_node();
    delta.add_type(interval.clone(), GSOG.term("Geologic_Time_Interval"));
    let interval_location = delta.blank_node();
    delta.add_type(interval_location.clone(), GSOC.term("Time_Interval_Location"));
    let range = delta.blank_node();
    delta.add_type(range.clone(), GSOC.term("Temporal_Range"));

    let end = delta.blank_node();
    delta.add_type(end.clone(), GSOC.term("Time_Numeric_Value"));
    delta.add(end.clone(), GSOC.term("hasDataValue"), literal::double(t_age));
    let start = delta.blank_node();
    delta.add_type(start.clone(), GSOC.term("Time_Numeric_Value"));
    delta.add(start.clone(), GSOC.term("hasDataValue"), literal::double(b_age));

    delta.add(ctx.object_node.clone(), GSOC.term("occupiesTimeDirectly"), interval.clone());
    delta.add(interval.clone(), GSOC.term("hasQuality"), interval_location.clone());
    delta.add(interval_location, GSOC.term("hasValue"), range.clone());
    delta.add(range.clone(), GSOC.term("hasEndValue"), end);
    delta.add(range, GSOC.term("hasStartValue"), start);
    add_authority_provenance(&mut delta, ctx, interval)?;

    Ok(delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_support::waldron_triplet;
    use crate::intervals::IntervalVocabulary;
    use crate::namespace::{rdf_type, GST, PROV};
    use crate::rdf::{Subject, Term};

    fn types_of(delta: &GraphDelta, node: &NamedNode) -> Vec<NamedNode> {
        let node = Subject::from(node.clone());
        delta
            .triples()
            .iter()
            .filter(|t| t.subject == node && t.predicate == rdf_type())
            .filter_map(|t| match &t.object {
                Term::NamedNode(class) => Some(class.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_rank_ordering_and_words() {
        assert!(Rank::Bed < Rank::Member && Rank::Group < Rank::Supergroup);
        assert_eq!(Rank::from_word("formation"), Some(Rank::Formation));
        assert_eq!(Rank::from_word("FM"), Some(Rank::Formation));
        assert_eq!(Rank::from_word("SGp"), None);
        assert_eq!(Rank::from_word("Shale"), None);
    }

    #[test]
    fn test_type_from_authority_rank() {
        let triplet = waldron_triplet();
        let intervals = IntervalVocabulary::builtin();
        let ctx = FeatureContext::new(&triplet, &intervals);
        let delta = stratigraphic_type(&ctx).unwrap();
        assert_eq!(types_of(&delta, &ctx.object_node), vec![GSGU.term("Formation")]);
    }

    #[test]
    fn test_type_from_name_then_generic() {
        let intervals = IntervalVocabulary::builtin();

        let mut triplet = waldron_triplet();
        triplet.object = TripletObject::Stratigraphy(Stratigraphy::new("Prairie du Chien Group"));
        let ctx = FeatureContext::new(&triplet, &intervals);
        assert_eq!(
            types_of(&stratigraphic_type(&ctx).unwrap(), &ctx.object_node),
            vec![GSGU.term("Group")]
        );

        triplet.object = TripletObject::Stratigraphy(Stratigraphy::new("Waldron Shale"));
        let ctx = FeatureContext::new(&triplet, &intervals);
        assert_eq!(
            types_of(&stratigraphic_type(&ctx).unwrap(), &ctx.object_node),
            vec![GSGU.term("StratigraphicUnit")]
        );
    }

    #[test]
    fn test_rank_relations_formation_in_group() {
        let triplet = waldron_triplet();
        let intervals = IntervalVocabulary::builtin();
        let ctx = FeatureContext::new(&triplet, &intervals);
        let delta = stratigraphic_rank_relations(&ctx).unwrap();

        let group = MSL.term("WayneGroup");
        assert!(delta.contains(ctx.object_node.clone(), GSOC.term("isPartOf"), group.clone()));
        assert_eq!(types_of(&delta, &group), vec![GSGU.term("Group")]);
        assert!(delta.contains(group.clone(), PROV.term("wasGeneratedBy"), MSL.term("macrostratQuery")));
        // own rank and blank bed are skipped
        assert!(!delta.triples().iter().any(|t| t.subject == Subject::from(MSL.term("WaldronFormation"))));
        assert!(!delta.triples().iter().any(|t| t.subject == Subject::from(MSL.term("Bed"))));
    }

    #[test]
    fn test_rank_relations_member_below_formation() {
        let mut triplet = waldron_triplet();
        if let TripletObject::Stratigraphy(strat) = &mut triplet.object {
            strat.mbr = Some("Lower".to_string());
        }
        let intervals = IntervalVocabulary::builtin();
        let ctx = FeatureContext::new(&triplet, &intervals);
        let delta = stratigraphic_rank_relations(&ctx).unwrap();
        assert!(delta.contains(
            MSL.term("LowerMember"),
            GSOC.term("isPartOf"),
            ctx.object_node.clone()
        ));
    }

    #[test]
    fn test_unknown_rank_fails() {
        let mut triplet = waldron_triplet();
        if let TripletObject::Stratigraphy(strat) = &mut triplet.object {
            strat.rank = Some("SubGp".to_string());
        }
        let intervals = IntervalVocabulary::builtin();
        let ctx = FeatureContext::new(&triplet, &intervals);
        assert_eq!(
            stratigraphic_rank_relations(&ctx),
            Err(FeatureError::UnknownRank("SubGp".to_string()))
        );
    }

    #[test]
    fn test_deposition_age_single_period() {
        let triplet = waldron_triplet();
        let intervals = IntervalVocabulary::builtin();
        let ctx = FeatureContext::new(&triplet, &intervals);
        let delta = deposition_age(&ctx).unwrap();

        let depositions: Vec<_> = delta
            .triples()
            .iter()
            .filter(|t| t.predicate == GSOC.term("occupiesTimeDirectly"))
            .collect();
        assert_eq!(depositions.len(), 1);
        assert_eq!(depositions[0].object, Term::from(GST.term("SilurianPeriod")));
    }

    #[test]
    fn test_deposition_age_unknown_interval() {
        let triplet = waldron_triplet();
        let intervals = IntervalVocabulary::default();
        let ctx = FeatureContext::new(&triplet, &intervals);
        assert_eq!(
            deposition_age(&ctx),
            Err(FeatureError::UnknownInterval("Silurian".to_string()))
        );
    }

    #[test]
    fn test_time_span_values() {
        let triplet = waldron_triplet();
        let intervals = IntervalVocabulary::builtin();
        let ctx = FeatureContext::new(&triplet, &intervals);
        let delta = time_span(&ctx).unwrap();

        let values: Vec<_> = delta
            .triples()
            .iter()
            .filter(|t| t.predicate == GSOC.term("hasDataValue"))
            .map(|t| t.object.clone())
            .collect();
        assert!(values.contains(&literal::double(427.4).into()));
        assert!(values.contains(&literal::double(429.65).into()));
    }

    #[test]
    fn test_unhydrated_unit_has_no_relations_or_span() {
        let mut triplet = waldron_triplet();
        triplet.object = TripletObject::Stratigraphy(Stratigraphy::new("Waldron Shale"));
        let intervals = IntervalVocabulary::builtin();
        let ctx = FeatureContext::new(&triplet, &intervals);
        assert!(stratigraphic_rank_relations(&ctx).unwrap().is_empty());
        assert!(deposition_age(&ctx).unwrap().is_empty());
        assert!(time_span(&ctx).unwrap().is_empty());
    }
}
