mod basic;
pub mod batch;
pub mod testcases;
pub mod prelude {
    use crate::basic;
    pub use basic::{elements, error, powerflow, solver, system};

    pub use crate::batch::{
        BatchConfig, BatchStatus, BatchTimers, Computers, FailurePolicy, ScenarioBatch,
        SecurityAnalysis,
    };
    pub use crate::testcases::case14;
    pub use basic::elements::{
        Branch, BranchTwoPort, Bus, BusElement, Generator, Injector, Line, Load, Shunt,
        StaticGenerator, Storage, Transformer,
    };
    pub use basic::error::{LinearSolveError, PfError};
    pub use basic::powerflow::{
        available_solvers, compute_pf, Divergence, GsOrdering, PfProblem, PowerFlowSolver,
        SolveOutcome, SolverConfig, SolverStatus, SolverTimers, SolverType,
    };
    pub use basic::solver::{Factorization, LinearSolverKind, Solve};
    pub use basic::system::{
        AssembledGrid, BranchEndResult, BranchFlow, BranchParams, ElementId, GridModel,
        InjectionResult, PowerFlowResult, PuConverter, Setpoints, TopologyId, TrafoRating,
    };
}
