use ethers::contract::abigen;

abigen!(
    DiamondCutFacet,
    r"[
        struct FacetCut { address facetAddress; uint8 action; bytes4[] functionSelectors; }

        function diamondCut(FacetCut[] calldata _diamondCut, address _init, bytes calldata _calldata) external
    ]"
);

abigen!(
    DiamondLoupeFacet,
    r"[
        struct Facet { address facetAddress; bytes4[] functionSelectors; }

        function facets() external view returns (Facet[] memory facets_)

        function facetFunctionSelectors(address _facet) external view returns (bytes4[] memory)

        function facetAddresses() external view returns (address[] memory)

        function facetAddress(bytes4 _functionSelector) external view returns (address)

        function supportsInterface(bytes4 _interfaceId) external view returns (bool)
    ]"
);

abigen!(
    OwnershipFacet,
    r"[
        function owner() external view returns (address)

        function transferOwnership(address _newOwner) external
    ]"
);
