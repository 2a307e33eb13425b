//! Built-in commands.

mod build;
mod byte_offset;
mod cover;
mod fmt;
mod generate_test;
mod gotest;
mod guru;
mod iferr;
mod lint;
mod metalint;
mod rename;
mod run;
mod switch_test;
mod vet;

pub use build::{build_command, project_packages, BuildCommand};
pub use byte_offset::ByteOffsetCommand;
pub use cover::{line_coverage, parse_profile, Block, CoverCommand, LineCoverage};
pub use fmt::{output_lines, stdin_diagnostics, FormatCommand};
pub use generate_test::{gotests_args, selection, GenerateTestCommand, Selection};
pub use gotest::{test_command, TestCommand};
pub use guru::{
    guru_args, modified_archive, parse_output, stream_values, GuruCommand, GuruMode, GuruModesFunction,
    GuruQueryFunction, GuruResult, Position,
};
pub use iferr::{insert_checks, IferrCommand};
pub use lint::{lint_targets, LintCommand};
pub use metalint::{metalint_args, parse_report, MetalintCommand};
pub use rename::{rename_args, RenameCommand};
pub use run::{run_args, RunCommand, RunLastCommand};
pub use switch_test::{counterpart, toggle_path, Direction, SwitchTestCommand};
pub use vet::{vet_args, VetCommand};

use crate::registry::CommandRegistry;
use std::sync::Arc;

/// Register every built-in command and function.
pub fn register_builtins(registry: &mut CommandRegistry) {
    registry.register(Arc::new(BuildCommand));
    registry.register(Arc::new(ByteOffsetCommand));
    registry.register(Arc::new(CoverCommand));
    registry.register(Arc::new(FormatCommand));
    registry.register(Arc::new(GenerateTestCommand));
    registry.register(Arc::new(GuruCommand));
    registry.register(Arc::new(IferrCommand));
    registry.register(Arc::new(LintCommand));
    registry.register(Arc::new(MetalintCommand));
    registry.register(Arc::new(RenameCommand));
    registry.register(Arc::new(RunCommand));
    registry.register(Arc::new(RunLastCommand));
    registry.register(Arc::new(SwitchTestCommand));
    registry.register(Arc::new(TestCommand));
    registry.register(Arc::new(VetCommand));

    registry.register_function(Arc::new(GuruModesFunction));
    registry.register_function(Arc::new(GuruQueryFunction));
}
