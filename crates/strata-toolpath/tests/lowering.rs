//! Lowering sliced layers into instruction streams.

use approx::assert_relative_eq;
use strata_math::Point3;
use strata_mesh::TriangleMesh;
use strata_slicer::{PrintMesh, PrintPipeline, PrintSettings};
use strata_toolpath::{
    estimate, AssemblerOptions, Heater, Instruction, JobAssembler, JobSettings, PrinterProfile,
    ToolpathAssembler,
};

fn extrudes(program: &[Instruction]) -> usize {
    program
        .iter()
        .filter(|i| matches!(i, Instruction::Extrude { .. }))
        .count()
}

#[test]
fn collinear_short_moves_decimate_to_step_count() {
    for (length, step, count) in [(0.03, 0.1, 25usize), (0.02, 0.07, 40), (0.011, 0.05, 33)] {
        let mut asm = ToolpathAssembler::new(AssemblerOptions {
            min_extrude_step: step,
            ..Default::default()
        });
        let start = Point3::new(5.0, 5.0, 0.2);
        asm.begin_travel().unwrap();
        asm.travel_to(start, 9000.0).unwrap();
        asm.end_travel().unwrap();
        for i in 1..=count {
            let to = Point3::new(start.x + length * i as f64, start.y, start.z);
            asm.extrude_to(to, 1200.0, 0.05).unwrap();
        }

        let total = length * count as f64;
        let intermediate = (total / step).floor() as usize;
        assert_eq!(extrudes(asm.instructions()), intermediate, "L={length} m={step} N={count}");
        let program = asm.finish().unwrap();
        assert_eq!(extrudes(&program), intermediate + 1);
        assert_relative_eq!(estimate(&program).extrude_mm, total, epsilon = 1e-9);
    }
}

#[test]
fn cube_job_round_trips_through_json() {
    let settings = PrintSettings::default();
    let mesh = TriangleMesh::cuboid([100.0, 100.0, 0.0], [115.0, 115.0, 2.0]);
    let layers = PrintPipeline::new(settings.clone(), vec![PrintMesh::solid(mesh)])
        .run()
        .unwrap();

    let profile = PrinterProfile::generic();
    let job = JobAssembler::new(profile.clone(), JobSettings::default(), &settings);
    let program = job.assemble(&layers).unwrap();

    assert!(matches!(program[0], Instruction::Comment { .. }));
    assert!(program.iter().any(|i| matches!(
        i,
        Instruction::Temperature {
            heater: Heater::Nozzle,
            wait: true,
            ..
        }
    )));
    assert!(program.iter().any(|i| matches!(i, Instruction::Fan { speed } if *speed == 1.0)));

    let mut last_e = 0.0;
    for i in &program {
        if let Instruction::Extrude { e: Some(e), .. } = i {
            assert!(*e >= last_e);
            last_e = *e;
        }
    }

    let est = estimate(&program);
    assert_eq!(est.layer_count, layers.len());
    assert!(est.seconds > 0.0);
    assert_relative_eq!(est.filament_mm, last_e, epsilon = 1e-6);
    let deposited: f64 = layers.iter().map(|l| l.deposition_length()).sum();
    assert_relative_eq!(est.extrude_mm, deposited, max_relative = 0.02);

    let lines: Vec<String> = program
        .iter()
        .map(|i| serde_json::to_string(i).unwrap())
        .collect();
    let parsed: Vec<Instruction> = lines
        .iter()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(parsed, program);
}

#[test]
fn part_outside_the_bed_is_rejected() {
    let settings = PrintSettings::default();
    let mesh = TriangleMesh::cuboid([210.0, 10.0, 0.0], [230.0, 30.0, 1.0]);
    let layers = PrintPipeline::new(settings.clone(), vec![PrintMesh::solid(mesh)])
        .run()
        .unwrap();

    let job = JobAssembler::new(PrinterProfile::generic(), JobSettings::default(), &settings);
    assert!(job.assemble(&layers).is_err());

    let unchecked = JobSettings {
        check_bounds: false,
        ..Default::default()
    };
    let job = JobAssembler::new(PrinterProfile::generic(), unchecked, &settings);
    assert!(job.assemble(&layers).is_ok());
}
