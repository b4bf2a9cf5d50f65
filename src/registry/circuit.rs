//! Halo 2 circuits used to check native hashing and proofs against the Poseidon gadget.
//!
//! `HashCircuit` exposes `Poseidon(message)` as its only public input. `PathCircuit`
//! recomputes a Merkle root from a leaf, siblings and direction bits the way a membership
//! circuit does: at each level bit 0 hashes `(current, sibling)` and bit 1 hashes
//! `(sibling, current)`.
use ff::Field;
use halo2_gadgets::poseidon::{
    primitives::{ConstantLength, P128Pow5T3},
    Hash as PoseidonHash, Pow5Chip, Pow5Config,
};
use halo2_proofs::{
    circuit::{AssignedCell, Layouter, SimpleFloorPlanner, Value},
    plonk::{
        Advice, Circuit, Column, ConstraintSystem, Constraints, Error, Expression, Instance,
        Selector,
    },
    poly::Rotation,
};
use pasta_curves::Fp;

#[derive(Clone, Debug)]
pub(crate) struct PoseidonConfig {
    pow5: Pow5Config<Fp, 3, 2>,
    primary: Column<Instance>,
}

fn configure_poseidon(meta: &mut ConstraintSystem<Fp>) -> PoseidonConfig {
    let state = [
        meta.advice_column(),
        meta.advice_column(),
        meta.advice_column(),
    ];
    let partial_sbox = meta.advice_column();
    let rc_a = [
        meta.fixed_column(),
        meta.fixed_column(),
        meta.fixed_column(),
    ];
    let rc_b = [
        meta.fixed_column(),
        meta.fixed_column(),
        meta.fixed_column(),
    ];
    meta.enable_constant(rc_b[0]);

    let primary = meta.instance_column();
    meta.enable_equality(primary);

    let pow5 = Pow5Chip::configure::<P128Pow5T3>(meta, state, partial_sbox, rc_a, rc_b);
    PoseidonConfig { pow5, primary }
}

fn poseidon_hash<const L: usize>(
    config: &PoseidonConfig,
    mut layouter: impl Layouter<Fp>,
    message: [AssignedCell<Fp, Fp>; L],
) -> Result<AssignedCell<Fp, Fp>, Error> {
    let chip = Pow5Chip::construct(config.pow5.clone());
    let hasher = PoseidonHash::<_, _, P128Pow5T3, ConstantLength<L>, 3, 2>::init(
        chip,
        layouter.namespace(|| "poseidon init"),
    )?;
    hasher.hash(layouter.namespace(|| "poseidon hash"), message)
}

#[derive(Clone, Debug)]
pub(crate) struct HashConfig {
    poseidon: PoseidonConfig,
    input: Column<Advice>,
}

/// Constrains `Poseidon(message)` to equal public input 0.
#[derive(Clone, Debug)]
pub(crate) struct HashCircuit<const L: usize> {
    message: Value<[Fp; L]>,
}

impl<const L: usize> HashCircuit<L> {
    pub(crate) fn new(message: [Fp; L]) -> Self {
        HashCircuit {
            message: Value::known(message),
        }
    }
}

impl<const L: usize> Circuit<Fp> for HashCircuit<L> {
    type Config = HashConfig;
    type FloorPlanner = SimpleFloorPlanner;

    fn without_witnesses(&self) -> Self {
        HashCircuit {
            message: Value::unknown(),
        }
    }

    fn configure(meta: &mut ConstraintSystem<Fp>) -> Self::Config {
        let input = meta.advice_column();
        meta.enable_equality(input);
        let poseidon = configure_poseidon(meta);
        HashConfig { poseidon, input }
    }

    fn synthesize(&self, config: Self::Config, mut layouter: impl Layouter<Fp>) -> Result<(), Error> {
        let message = layouter.assign_region(
            || "load message",
            |mut region| {
                let mut cells = Vec::with_capacity(L);
                for i in 0..L {
                    let value = self.message.map(|m| m[i]);
                    cells.push(region.assign_advice(
                        || format!("message {i}"),
                        config.input,
                        i,
                        || value,
                    )?);
                }
                Ok(cells)
            },
        )?;
        let message: [AssignedCell<Fp, Fp>; L] = message
            .try_into()
            .map_err(|_| Error::Synthesis)?;

        let digest = poseidon_hash(&config.poseidon, layouter.namespace(|| "hash"), message)?;
        layouter.constrain_instance(digest.cell(), config.poseidon.primary, 0)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct PathConfig {
    poseidon: PoseidonConfig,
    s_swap: Selector,
    current: Column<Advice>,
    sibling: Column<Advice>,
    bit: Column<Advice>,
    left: Column<Advice>,
    right: Column<Advice>,
}

/// Replays a Merkle path in-circuit and constrains the result to public input 0.
#[derive(Clone, Debug)]
pub(crate) struct PathCircuit {
    leaf: Value<Fp>,
    siblings: Vec<Value<Fp>>,
    bits: Vec<Value<Fp>>,
}

impl PathCircuit {
    pub(crate) fn new(leaf: Fp, siblings: &[Fp], bits: &[u8]) -> Self {
        PathCircuit {
            leaf: Value::known(leaf),
            siblings: siblings.iter().copied().map(Value::known).collect(),
            bits: bits.iter().map(|b| Value::known(Fp::from(*b as u64))).collect(),
        }
    }
}

impl Circuit<Fp> for PathCircuit {
    type Config = PathConfig;
    type FloorPlanner = SimpleFloorPlanner;

    fn without_witnesses(&self) -> Self {
        PathCircuit {
            leaf: Value::unknown(),
            siblings: vec![Value::unknown(); self.siblings.len()],
            bits: vec![Value::unknown(); self.bits.len()],
        }
    }

    fn configure(meta: &mut ConstraintSystem<Fp>) -> Self::Config {
        let current = meta.advice_column();
        let sibling = meta.advice_column();
        let bit = meta.advice_column();
        let left = meta.advice_column();
        let right = meta.advice_column();
        for column in [current, sibling, bit, left, right] {
            meta.enable_equality(column);
        }

        let s_swap = meta.selector();
        meta.create_gate("conditional swap", |meta| {
            let s = meta.query_selector(s_swap);
            let current = meta.query_advice(current, Rotation::cur());
            let sibling = meta.query_advice(sibling, Rotation::cur());
            let bit = meta.query_advice(bit, Rotation::cur());
            let left = meta.query_advice(left, Rotation::cur());
            let right = meta.query_advice(right, Rotation::cur());
            let one = Expression::Constant(Fp::ONE);
            Constraints::with_selector(
                s,
                [
                    bit.clone() * (one - bit.clone()),
                    left - (current.clone() + bit.clone() * (sibling.clone() - current.clone())),
                    right - (sibling.clone() + bit * (current - sibling)),
                ],
            )
        });

        let poseidon = configure_poseidon(meta);
        PathConfig {
            poseidon,
            s_swap,
            current,
            sibling,
            bit,
            left,
            right,
        }
    }

    fn synthesize(&self, config: Self::Config, mut layouter: impl Layouter<Fp>) -> Result<(), Error> {
        let mut node = layouter.assign_region(
            || "load leaf",
            |mut region| region.assign_advice(|| "leaf", config.current, 0, || self.leaf),
        )?;

        for (level, (sibling, bit)) in self.siblings.iter().zip(self.bits.iter()).enumerate() {
            let (left, right) = layouter.assign_region(
                || format!("swap {level}"),
                |mut region| {
                    config.s_swap.enable(&mut region, 0)?;
                    let current = node.copy_advice(|| "current", &mut region, config.current, 0)?;
                    region.assign_advice(|| "sibling", config.sibling, 0, || *sibling)?;
                    region.assign_advice(|| "bit", config.bit, 0, || *bit)?;

                    let current = current.value().copied();
                    let left = current
                        .zip(*sibling)
                        .zip(*bit)
                        .map(|((c, s), b)| if b == Fp::ZERO { c } else { s });
                    let right = current
                        .zip(*sibling)
                        .zip(*bit)
                        .map(|((c, s), b)| if b == Fp::ZERO { s } else { c });
                    let left = region.assign_advice(|| "left", config.left, 0, || left)?;
                    let right = region.assign_advice(|| "right", config.right, 0, || right)?;
                    Ok((left, right))
                },
            )?;
            node = poseidon_hash(
                &config.poseidon,
                layouter.namespace(|| format!("node {level}")),
                [left, right],
            )?;
        }

        layouter.constrain_instance(node.cell(), config.poseidon.primary, 0)
    }
}
