//! Theoretical background.
//!
//! # Contents
//! - [Discretization](#discretization)
//! - [Bond splitting](#bond-splitting)
//! - [Rotating frame](#rotating-frame)
//! - [Imaginary time](#imaginary-time)
//! - [Domain decomposition](#domain-decomposition)
//!
//! # Discretization
//! The wavefunction lives on a regular grid of *N*<sub>*y*</sub> ×
//! *N*<sub>*x*</sub> points spaced by *dx* and *dy*, with cell (*i*, *j*) at
//! (*x*, *y*) = (*j* *dx*, *i* *dy*). In units where ħ = 1 the Hamiltonian is
//! ```text
//!        1
//! H = - --- ∇² + V(x, y) + g |ψ|² - Ω L_z
//!       2 m
//! ```
//! and the Laplacian is replaced by the five-point finite difference. Writing
//! the hopping amplitudes
//! ```text
//!         1                1
//! t_x = ------,    t_y = ------
//!       2 m dx²          2 m dy²
//! ```
//! the discrete kinetic operator is a constant diagonal *D* = 2 *t*<sub>*x*</sub>
//! \+ 2 *t*<sub>*y*</sub> plus a sum of nearest-neighbour *bond* terms, each
//! coupling only two cells:
//! ```text
//!               [ 0  w ]
//! h_bond = w -> [      ]    w = -t
//!               [ w* 0 ]
//! ```
//! Along a closed edge, bonds that would leave the domain are simply absent,
//! which is the same as holding ψ = 0 just outside it. Along a periodic edge
//! the last cell bonds to the first.
//!
//! # Bond splitting
//! The Hamiltonian is split into the potential part
//! ```text
//! P = V + D + g |ψ|²
//! ```
//! which is diagonal in position space, and four families of bonds: row bonds
//! (along *x*) and column bonds (along *y*), each separated by the parity of the
//! lower cell's global index. Bonds within one family share no cells, so the
//! exponential of the family is the product of exact 2 × 2 exponentials:
//! ```text
//!            [     cos(τr)       -i sin(τr) w/r ]
//! e^(-iτh) = [                                  ],   r = |w|
//!            [ -i sin(τr) w*/r       cos(τr)    ]
//! ```
//! Sandwiching the potential step between two half-steps of the bond families
//! in mirrored order gives a symmetric (Strang) product,
//! ```text
//! e^(-i H dt) = K(dt/2) e^(-i P dt) K(dt/2)ᵀ + O(dt³)
//!
//! K(τ) = C₀(τ) R₀(τ) C₁(τ) R₁(τ)
//! ```
//! where *R*<sub>*p*</sub> and *C*<sub>*p*</sub> are the row and column families
//! of parity *p*, and ᵀ reverses the order of the factors. Every factor is
//! exactly unitary, so the norm is conserved to rounding error in real time
//! whatever the step size; the step size only controls the splitting error.
//!
//! For a plane wave on a periodic grid the scheme reproduces the discrete
//! dispersion relation
//! ```text
//!        1 - cos(k dx)
//! E(k) = -------------
//!           m dx²
//! ```
//! up to the splitting error, rather than the continuum *k*²/2*m*.
//!
//! The nonlinear term *g* |ψ|² commutes with itself, so the potential step can
//! use the density at the start of the step without loss of order.
//!
//! # Rotating frame
//! In a frame rotating at angular frequency Ω about (*x*<sub>*c*</sub>,
//! *y*<sub>*c*</sub>) the Hamiltonian gains the term -Ω *L*<sub>*z*</sub>, with
//! ```text
//! L_z = -i [(x - x_c) ∂_y - (y - y_c) ∂_x]
//! ```
//! Discretizing the first derivatives with central differences adds an
//! imaginary part to every bond amplitude:
//! ```text
//!                    Ω (y - y_c)                       Ω (x - x_c)
//! row bonds:    α = - -----------    column bonds:  α = -----------
//!                       2 dx                              2 dy
//!
//! w = -t + i α
//! ```
//! The bond term stays Hermitian, so the rotating frame costs nothing beyond a
//! complex bond amplitude and the splitting above applies unchanged.
//!
//! # Imaginary time
//! Substituting *t* → -*i* τ turns every exponential into a decaying one:
//! ```text
//! e^(-iτh) -> e^(-τh):   cos(τr) -> cosh(τr),   -i sin(τr) -> -sinh(τr)
//!
//! e^(-i P dt) -> e^(-P dt)
//! ```
//! Repeated application suppresses every eigencomponent relative to the ground
//! state, at the cost of shrinking the norm; the solver therefore rescales the
//! wavefunction to unit norm after a configurable number of steps.
//!
//! # Domain decomposition
//! Each worker owns a rectangular block of the grid and stores it with a border
//! of [`HALO`][crate::lattice::HALO] ghost cells copied from its neighbours.
//! A step applies four bond sweeps along each axis. A sweep along *x* leaves
//! the outermost cell that has lost its partner wrong, and every later sweep
//! along *x* spreads the error one cell further in; sweeps along *y* never
//! move it sideways. With a border of four cells the whole tile can therefore
//! be stepped without communication and the owned block is still exact
//! afterward. Ghost cells are then refreshed once per step.
//!
//! For this to work every worker must pair the same cells into bonds, so bond
//! parity is taken from global indices; on a periodic axis this requires an
//! even number of points.
