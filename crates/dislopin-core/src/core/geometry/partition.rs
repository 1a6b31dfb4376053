use super::GeometryError;
use super::region::{NamedRegion, Region};
use crate::core::models::configuration::AtomicConfiguration;
use crate::core::models::simulation_box::{Axis, SimulationBox};
use nalgebra::Point3;
use rayon::prelude::*;
use std::fmt;

/// The single group that owns an atom.
///
/// Ownership follows `Precipitate > TopSurface > BottomSurface > Mobile`; an atom inside
/// both the precipitate sphere and a surface slab belongs to the precipitate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupLabel {
    Precipitate,
    TopSurface,
    BottomSurface,
    Mobile,
}

impl GroupLabel {
    pub const ALL: [GroupLabel; 4] = [
        GroupLabel::Precipitate,
        GroupLabel::TopSurface,
        GroupLabel::BottomSurface,
        GroupLabel::Mobile,
    ];

    /// Name of the engine group holding these atoms.
    pub fn group_name(self) -> &'static str {
        match self {
            GroupLabel::Precipitate => "precipitate",
            GroupLabel::TopSurface => "top_surface",
            GroupLabel::BottomSurface => "bottom_surface",
            GroupLabel::Mobile => "mobile_atoms",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for GroupLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.group_name())
    }
}

/// Precipitate sphere and surface slabs carved from a relaxed box.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionLayout {
    pub free_axis: Axis,
    pub precipitate: NamedRegion,
    pub top_slab: NamedRegion,
    pub bottom_slab: NamedRegion,
}

impl PartitionLayout {
    /// Places a sphere of `radius` at the box center and slabs of `surface_depth` measured
    /// inward from both faces normal to `free_axis`.
    ///
    /// # Errors
    ///
    /// Rejects non-positive sizes, a sphere reaching half the shortest extent, and slabs that
    /// together span the free axis.
    pub fn for_box(
        simulation_box: &SimulationBox,
        free_axis: Axis,
        radius: f64,
        surface_depth: f64,
    ) -> Result<Self, GeometryError> {
        if radius <= 0.0 {
            return Err(GeometryError::NonPositive {
                name: "precipitate radius",
                value: radius,
            });
        }
        if surface_depth <= 0.0 {
            return Err(GeometryError::NonPositive {
                name: "surface depth",
                value: surface_depth,
            });
        }
        let (axis, shortest) = simulation_box.shortest_axis();
        let half_extent = 0.5 * shortest;
        if radius >= half_extent {
            return Err(GeometryError::RadiusExceedsBox {
                radius,
                half_extent,
                axis,
            });
        }
        let extent = simulation_box.extent(free_axis);
        if 2.0 * surface_depth >= extent {
            return Err(GeometryError::SurfacesOverlap {
                depth: surface_depth,
                extent,
                axis: free_axis,
            });
        }

        let i = free_axis.index();
        Ok(Self {
            free_axis,
            precipitate: NamedRegion::new(
                "precipitate_region",
                Region::Sphere {
                    center: simulation_box.center(),
                    radius,
                },
            ),
            top_slab: NamedRegion::new(
                "top_surface_region",
                Region::Slab {
                    axis: free_axis,
                    lower: Some(simulation_box.upper[i] - surface_depth),
                    upper: None,
                },
            ),
            bottom_slab: NamedRegion::new(
                "bottom_surface_region",
                Region::Slab {
                    axis: free_axis,
                    lower: None,
                    upper: Some(simulation_box.lower[i] + surface_depth),
                },
            ),
        })
    }

    pub fn classify(&self, position: &Point3<f64>) -> GroupLabel {
        if self.precipitate.region.contains(position) {
            GroupLabel::Precipitate
        } else if self.top_slab.region.contains(position) {
            GroupLabel::TopSurface
        } else if self.bottom_slab.region.contains(position) {
            GroupLabel::BottomSurface
        } else {
            GroupLabel::Mobile
        }
    }

    /// Assigns every atom of `config` to exactly one group.
    pub fn partition(&self, config: &AtomicConfiguration) -> Partition {
        let assignments: Vec<(u64, GroupLabel)> = config
            .atoms()
            .par_iter()
            .map(|atom| (atom.id, self.classify(&atom.position)))
            .collect();
        let mut counts = [0usize; 4];
        for (_, label) in &assignments {
            counts[label.index()] += 1;
        }
        Partition {
            assignments,
            counts,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    assignments: Vec<(u64, GroupLabel)>,
    counts: [usize; 4],
}

impl Partition {
    pub fn count(&self, label: GroupLabel) -> usize {
        self.counts[label.index()]
    }

    pub fn total(&self) -> usize {
        self.assignments.len()
    }

    /// Ids owned by `label`, in configuration order.
    pub fn members(&self, label: GroupLabel) -> Vec<u64> {
        self.assignments
            .iter()
            .filter(|(_, l)| *l == label)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn label_of(&self, id: u64) -> Option<GroupLabel> {
        self.assignments
            .iter()
            .find(|(atom_id, _)| *atom_id == id)
            .map(|(_, label)| *label)
    }

    /// Dynamics needs a thermostatted interior; an empty mobile group is degenerate.
    pub fn ensure_mobile_atoms(&self) -> Result<(), GeometryError> {
        if self.count(GroupLabel::Mobile) == 0 {
            return Err(GeometryError::EmptyGroup(GroupLabel::Mobile.group_name()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::atom::Atom;
    use crate::core::models::simulation_box::Periodicity;

    fn grid_config(extent: f64, spacing: f64) -> AtomicConfiguration {
        let b = SimulationBox::new(
            [0.0, -0.5 * extent, 0.0],
            [extent, 0.5 * extent, extent],
            Periodicity::slab(Axis::Y),
        );
        let mut config = AtomicConfiguration::new(b, 1);
        let n = (extent / spacing) as usize;
        let mut id = 1;
        for i in 0..n {
            for j in 0..=n {
                for k in 0..n {
                    let p = Point3::new(
                        i as f64 * spacing,
                        -0.5 * extent + j as f64 * spacing,
                        k as f64 * spacing,
                    );
                    config.push(Atom::new(id, 1, p)).unwrap();
                    id += 1;
                }
            }
        }
        config
    }

    #[test]
    fn partition_is_complete_and_disjoint() {
        let config = grid_config(40.0, 2.0);
        let layout =
            PartitionLayout::for_box(&config.simulation_box, Axis::Y, 8.0, 5.0).unwrap();
        let partition = layout.partition(&config);

        let total: usize = GroupLabel::ALL.iter().map(|l| partition.count(*l)).sum();
        assert_eq!(total, config.len());
        assert_eq!(partition.total(), config.len());

        let mut seen = std::collections::HashSet::new();
        for label in GroupLabel::ALL {
            for id in partition.members(label) {
                assert!(seen.insert(id), "atom {} owned twice", id);
            }
            assert!(partition.count(label) > 0, "{} is empty", label);
        }
        partition.ensure_mobile_atoms().unwrap();
    }

    #[test]
    fn precipitate_wins_over_surface_and_top_wins_over_bottom() {
        let b = SimulationBox::new([0.0, 0.0, 0.0], [40.0, 12.0, 40.0], Periodicity::slab(Axis::Y));
        let layout = PartitionLayout::for_box(&b, Axis::Y, 5.5, 5.0).unwrap();
        // Inside the sphere and the top slab.
        assert_eq!(
            layout.classify(&Point3::new(20.0, 7.5, 20.0)),
            GroupLabel::Precipitate
        );
        assert_eq!(
            layout.classify(&Point3::new(0.0, 7.5, 0.0)),
            GroupLabel::TopSurface
        );
        assert_eq!(
            layout.classify(&Point3::new(0.0, 4.0, 0.0)),
            GroupLabel::BottomSurface
        );
        assert_eq!(
            layout.classify(&Point3::new(0.0, 6.0, 0.0)),
            GroupLabel::Mobile
        );
    }

    #[test]
    fn rejects_radius_of_half_the_shortest_extent() {
        let b = SimulationBox::new([0.0; 3], [40.0; 3], Periodicity::slab(Axis::Y));
        assert_eq!(
            PartitionLayout::for_box(&b, Axis::Y, 25.0, 5.0),
            Err(GeometryError::RadiusExceedsBox {
                radius: 25.0,
                half_extent: 20.0,
                axis: Axis::X,
            })
        );
        assert!(PartitionLayout::for_box(&b, Axis::Y, 20.0, 5.0).is_err());
    }

    #[test]
    fn rejects_surfaces_spanning_the_free_axis() {
        let b = SimulationBox::new([0.0; 3], [40.0, 10.0, 40.0], Periodicity::slab(Axis::Y));
        assert!(matches!(
            PartitionLayout::for_box(&b, Axis::Y, 2.0, 5.0),
            Err(GeometryError::SurfacesOverlap { axis: Axis::Y, .. })
        ));
    }

    #[test]
    fn empty_mobile_group_is_degenerate() {
        let b = SimulationBox::new([0.0; 3], [40.0; 3], Periodicity::slab(Axis::Y));
        let mut config = AtomicConfiguration::new(b, 1);
        config.push(Atom::new(1, 1, Point3::new(20.0, 20.0, 20.0))).unwrap();
        config.push(Atom::new(2, 1, Point3::new(0.0, 39.0, 0.0))).unwrap();
        let layout = PartitionLayout::for_box(&config.simulation_box, Axis::Y, 5.0, 5.0).unwrap();
        let partition = layout.partition(&config);
        assert_eq!(partition.label_of(2), Some(GroupLabel::TopSurface));
        assert_eq!(
            partition.ensure_mobile_atoms(),
            Err(GeometryError::EmptyGroup("mobile_atoms"))
        );
    }
}
