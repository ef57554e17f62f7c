use super::nodes::CalculateKind;
use super::nodes::CalculateNode;
use super::nodes::Collect1DNode;
use super::nodes::ExcludeNode;
use super::nodes::NodeRef;
use super::nodes::Normalisation;
use super::nodes::Process1DNode;
use super::nodes::SelectNode;
use super::nodes::Sequence;
use super::NodeResult;
use super::Procedure;
use super::ProcedureContext;
use super::ProcedureNode;
use crate::configuration::Configuration;
use crate::data::Data1D;
use crate::generic::GenericList;
use crate::pool::ProcessPool;
use crate::procedure::nodes::AddSpeciesNode;
use crate::procedure::nodes::BoxNode;
use crate::simbox::SimBox;
use crate::species::Species;
use nalgebra::Vector3;
use rand::rngs::SmallRng;
use rand::Rng;
use rand::SeedableRng;
use std::sync::Arc;

fn argon_with_site() -> Arc<Species> {
    let mut sp = Species::new("argon");
    sp.add_atom("Ar", 0, 0.0, Vector3::zeros());
    sp.add_site("COM", vec![0]).unwrap();
    sp.finalise();
    Arc::new(sp)
}

fn scattered_configuration(n: usize, box_length: f64) -> Configuration {
    let mut cfg = Configuration::new("bulk");
    cfg.set_box(SimBox::cubic(box_length).unwrap());
    let sp = argon_with_site();
    let mut rng = SmallRng::seed_from_u64(2024);
    for _ in 0..n {
        let r = Vector3::new(rng.random::<f64>(), rng.random::<f64>(), rng.random::<f64>()) * box_length;
        cfg.add_molecule(sp.clone(), Some(&[r]));
    }
    cfg
}

fn reference(id: usize, name: &str) -> NodeRef {
    NodeRef {
        id,
        name: name.to_string(),
    }
}

/// Select A { Select B excluding A's molecule { distance -> histogram } }
/// followed by a Process1D with full radial-distribution normalisation
fn rdf_procedure(range: f64, bin_width: f64) -> Procedure {
    let sp = argon_with_site();
    let calculate = CalculateNode {
        id: 2,
        name: "rAB".to_string(),
        kind: CalculateKind::Distance,
        sites: vec![reference(0, "A"), reference(1, "B")],
    };
    let collect = Collect1DNode {
        id: 3,
        name: "histo".to_string(),
        observable: reference(2, "rAB"),
        minimum: 0.0,
        maximum: range,
        bin_width,
    };
    let inner = SelectNode {
        id: 1,
        name: "B".to_string(),
        targets: vec![(sp.clone(), 0)],
        exclude_same_molecule: vec![reference(0, "A")],
        exclude_same_site: vec![],
        for_each: Sequence {
            nodes: vec![ProcedureNode::Calculate(calculate), ProcedureNode::Collect1D(collect)],
        },
    };
    let outer = SelectNode {
        id: 0,
        name: "A".to_string(),
        targets: vec![(sp, 0)],
        exclude_same_molecule: vec![],
        exclude_same_site: vec![],
        for_each: Sequence {
            nodes: vec![ProcedureNode::Select(inner)],
        },
    };
    let process = Process1DNode {
        id: 4,
        name: "gr".to_string(),
        source: reference(3, "histo"),
        normalisation: Normalisation {
            site_population: vec![reference(0, "A")],
            number_density: vec![reference(1, "B")],
            spherical_shell_volume: true,
            factor: None,
            to_one: false,
        },
        value_label: "g(r)".to_string(),
        x_label: "r, Angstroms".to_string(),
        save: false,
    };
    let mut procedure = Procedure::new(ProcedureContext::Analysis);
    procedure.add_node(ProcedureNode::Select(outer)).unwrap();
    procedure.add_node(ProcedureNode::Process1D(process)).unwrap();
    procedure
}

#[test]
fn radial_distribution_of_an_ideal_gas_is_flat() {
    let pool = ProcessPool::serial();
    let mut cfg = scattered_configuration(400, 24.0);
    let mut list = GenericList::default();
    let mut procedure = rdf_procedure(8.0, 0.1);
    assert_eq!(procedure.execute(&pool, &mut cfg, "rdf", &mut list), NodeResult::Success);
    let gr = list.value("gr_bulk", "rdf", Data1D::default());
    assert_eq!(gr.n_values(), 80);
    assert_eq!(gr.tag, "rdf//Process1D//bulk//gr");
    // ignore the first couple of Angstroms where single-bin noise bites
    let tail: Vec<f64> = gr
        .x
        .iter()
        .zip(&gr.values)
        .filter(|(x, _)| **x > 2.0)
        .map(|(_, v)| *v)
        .collect();
    let mean = tail.iter().sum::<f64>() / tail.len() as f64;
    assert!((mean - 1.0).abs() < 0.15, "mean g(r) over tail was {}", mean);
}

#[test]
fn unchanged_configuration_is_not_reprocessed() {
    let pool = ProcessPool::serial();
    let mut cfg = scattered_configuration(60, 20.0);
    let mut list = GenericList::default();
    let mut procedure = rdf_procedure(8.0, 0.25);
    assert_eq!(procedure.execute(&pool, &mut cfg, "rdf", &mut list), NodeResult::Success);
    let first = list.value("gr_bulk", "rdf", Data1D::default());
    let version = list.version("gr_bulk", "rdf").unwrap();
    // identical contents version: the procedure refuses to run again
    assert_eq!(procedure.execute(&pool, &mut cfg, "rdf", &mut list), NodeResult::Success);
    assert_eq!(list.value("gr_bulk", "rdf", Data1D::default()), first);
    assert_eq!(list.version("gr_bulk", "rdf").unwrap(), version);
    // a mutation re-enables processing and rewrites the stored data
    let r = cfg.atom(0).unwrap().r + Vector3::new(0.5, 0.0, 0.0);
    cfg.set_atom_position(0, r);
    assert_eq!(procedure.execute(&pool, &mut cfg, "rdf", &mut list), NodeResult::Success);
    assert!(list.version("gr_bulk", "rdf").unwrap() > version);
}

#[test]
fn exclude_node_skips_the_remainder_of_the_iteration() {
    let sp = argon_with_site();
    let calculate = CalculateNode {
        id: 3,
        name: "rAB".to_string(),
        kind: CalculateKind::Distance,
        sites: vec![reference(0, "A"), reference(1, "B")],
    };
    let collect = Collect1DNode {
        id: 4,
        name: "histo".to_string(),
        observable: reference(3, "rAB"),
        minimum: 0.0,
        maximum: 40.0,
        bin_width: 0.5,
    };
    let guard = ExcludeNode {
        id: 2,
        name: "guard".to_string(),
        same_site: Some((reference(0, "A"), reference(1, "B"))),
    };
    let inner = SelectNode {
        id: 1,
        name: "B".to_string(),
        targets: vec![(sp.clone(), 0)],
        exclude_same_molecule: vec![],
        exclude_same_site: vec![],
        for_each: Sequence {
            nodes: vec![
                ProcedureNode::Exclude(guard),
                ProcedureNode::Calculate(calculate),
                ProcedureNode::Collect1D(collect),
            ],
        },
    };
    let outer = SelectNode {
        id: 0,
        name: "A".to_string(),
        targets: vec![(sp, 0)],
        exclude_same_molecule: vec![],
        exclude_same_site: vec![],
        for_each: Sequence {
            nodes: vec![ProcedureNode::Select(inner)],
        },
    };
    let mut procedure = Procedure::new(ProcedureContext::Analysis);
    procedure.add_node(ProcedureNode::Select(outer)).unwrap();
    let pool = ProcessPool::serial();
    let mut cfg = scattered_configuration(3, 20.0);
    let mut list = GenericList::default();
    assert_eq!(procedure.execute(&pool, &mut cfg, "test", &mut list), NodeResult::Success);
    // 3 x 3 site pairs, of which the 3 self pairs are skipped
    let binned = procedure.state().hist1d.get(&4).unwrap().n_binned;
    assert_eq!(binned, 6);
}

#[test]
fn generation_nodes_build_a_configuration() {
    let mut sp = Species::new("water");
    sp.add_atom("OW", 0, -0.82, Vector3::new(0.0, 0.0, 0.0));
    sp.add_atom("HW1", 1, 0.41, Vector3::new(0.96, 0.0, 0.0));
    sp.add_atom("HW2", 1, 0.41, Vector3::new(-0.24, 0.93, 0.0));
    sp.finalise();
    let sp = Arc::new(sp);
    let mut generator = Procedure::new(ProcedureContext::Generation);
    generator
        .add_node(ProcedureNode::Box(BoxNode {
            id: 0,
            name: "box".to_string(),
            lengths: Vector3::new(20.0, 20.0, 20.0),
            angles: Vector3::new(90.0, 90.0, 90.0),
            non_periodic: false,
        }))
        .unwrap();
    generator
        .add_node(ProcedureNode::AddSpecies(AddSpeciesNode {
            id: 1,
            name: "water".to_string(),
            species: sp,
            population: 30,
        }))
        .unwrap();
    let pool = ProcessPool::serial();
    let mut cfg = Configuration::new("bulk");
    cfg.set_seed(7);
    let mut list = GenericList::default();
    assert_eq!(generator.execute(&pool, &mut cfg, "generate", &mut list), NodeResult::Success);
    assert_eq!(cfg.n_molecules(), 30);
    assert_eq!(cfg.n_atoms(), 90);
    assert!((cfg.sim_box().axis_lengths().x - 20.0).abs() < 1e-12);
    // deterministic: the same seed regenerates identical coordinates
    let mut other = Configuration::new("bulk");
    other.set_seed(7);
    let mut generator2 = Procedure::new(ProcedureContext::Generation);
    generator2
        .add_node(ProcedureNode::Box(BoxNode {
            id: 0,
            name: "box".to_string(),
            lengths: Vector3::new(20.0, 20.0, 20.0),
            angles: Vector3::new(90.0, 90.0, 90.0),
            non_periodic: false,
        }))
        .unwrap();
    let mut sp2 = Species::new("water");
    sp2.add_atom("OW", 0, -0.82, Vector3::new(0.0, 0.0, 0.0));
    sp2.add_atom("HW1", 1, 0.41, Vector3::new(0.96, 0.0, 0.0));
    sp2.add_atom("HW2", 1, 0.41, Vector3::new(-0.24, 0.93, 0.0));
    sp2.finalise();
    generator2
        .add_node(ProcedureNode::AddSpecies(AddSpeciesNode {
            id: 1,
            name: "water".to_string(),
            species: Arc::new(sp2),
            population: 30,
        }))
        .unwrap();
    assert_eq!(generator2.execute(&pool, &mut other, "generate", &mut list), NodeResult::Success);
    for (a, b) in cfg.atoms().iter().zip(other.atoms()) {
        assert!((a.r - b.r).norm() < 1e-12);
    }
}

#[test]
fn nodes_are_validated_against_the_context() {
    let mut analysis = Procedure::new(ProcedureContext::Analysis);
    let node = ProcedureNode::Box(BoxNode {
        id: 0,
        name: "box".to_string(),
        lengths: Vector3::new(10.0, 10.0, 10.0),
        angles: Vector3::new(90.0, 90.0, 90.0),
        non_periodic: false,
    });
    assert!(analysis.add_node(node).is_err());
}

#[test]
fn missing_observable_fails_the_procedure() {
    let sp = argon_with_site();
    let collect = Collect1DNode {
        id: 1,
        name: "histo".to_string(),
        observable: reference(9, "nothing"),
        minimum: 0.0,
        maximum: 10.0,
        bin_width: 0.5,
    };
    let outer = SelectNode {
        id: 0,
        name: "A".to_string(),
        targets: vec![(sp, 0)],
        exclude_same_molecule: vec![],
        exclude_same_site: vec![],
        for_each: Sequence {
            nodes: vec![ProcedureNode::Collect1D(collect)],
        },
    };
    let mut procedure = Procedure::new(ProcedureContext::Analysis);
    procedure.add_node(ProcedureNode::Select(outer)).unwrap();
    let pool = ProcessPool::serial();
    let mut cfg = scattered_configuration(2, 20.0);
    let mut list = GenericList::default();
    assert_eq!(procedure.execute(&pool, &mut cfg, "test", &mut list), NodeResult::Failure);
}
